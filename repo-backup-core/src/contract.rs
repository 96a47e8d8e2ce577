//! # contract: data model and pipeline seams
//!
//! The three collaborators of the backup pipeline are traits so the
//! orchestration can run against real services or against `mockall` mocks:
//! - [`RepositoryLister`]: lists the repositories of the token's owner
//! - [`Cloner`]: materialises one working copy on disk
//! - [`ArchiveStore`]: ships the finished archive to remote storage
//!
//! Mocks (`MockRepositoryLister`, `MockCloner`, `MockArchiveStore`) are exported
//! under the `test-export-mocks` feature so integration tests can use them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::automock;
use serde::Deserialize;

use crate::error::BackupError;

/// One remote repository, as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryDescriptor {
    /// Short name, matched against the name filter.
    pub name: String,
    /// `owner/name`; unique per account and used as the relative clone path.
    pub full_name: String,
    /// HTTPS clone endpoint.
    pub clone_url: String,
}

/// Outcome of a single clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneResult {
    Pending,
    /// `head` is `None` when there was no repository to inspect: the
    /// destination was already populated, or the remote has no commits yet.
    Succeeded { head: Option<String> },
    Failed(String),
}

impl CloneResult {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CloneResult::Pending)
    }
}

/// A clone dispatched by the orchestrator, together with its result.
#[derive(Debug, Clone)]
pub struct CloneJob {
    pub descriptor: RepositoryDescriptor,
    pub destination: PathBuf,
    pub result: CloneResult,
}

impl CloneJob {
    pub fn new(descriptor: RepositoryDescriptor, destination_root: &Path) -> Self {
        let destination = destination_root.join(&descriptor.full_name);
        Self {
            descriptor,
            destination,
            result: CloneResult::Pending,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.result, CloneResult::Succeeded { .. })
    }

    /// The failure of this job as a [`BackupError`], if it failed.
    pub fn error(&self) -> Option<BackupError> {
        match &self.result {
            CloneResult::Failed(message) => Some(BackupError::Clone {
                repository: self.descriptor.full_name.clone(),
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

/// Where the archive goes when remote storage is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub bucket: String,
    pub key_prefix: Option<String>,
    /// Explicit region; the ambient AWS configuration is used when absent.
    pub region: Option<String>,
}

/// Terminal state of the single upload attempt of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Succeeded { key: String },
    /// The storage service answered with an error.
    FailedRemote { code: String, message: String },
    /// The artifact could not be read, or no response was received.
    FailedLocal(String),
}

impl UploadOutcome {
    pub fn error(&self) -> Option<BackupError> {
        match self {
            UploadOutcome::Succeeded { .. } => None,
            UploadOutcome::FailedRemote { code, message } => Some(BackupError::RemoteStorage {
                code: code.clone(),
                message: message.clone(),
            }),
            UploadOutcome::FailedLocal(message) => Some(BackupError::Upload(message.clone())),
        }
    }
}

/// Lists every repository owned by the identity behind an access token.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RepositoryLister: Send + Sync {
    /// Returns the descriptors in provider order.
    async fn list_repositories(
        &self,
        access_token: &str,
    ) -> Result<Vec<RepositoryDescriptor>, BackupError>;
}

/// Produces a full working copy of one repository.
///
/// Implementations must never panic on clone failures; every error is reported
/// through [`CloneResult::Failed`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Cloner: Send + Sync {
    async fn clone_repository(
        &self,
        clone_url: &str,
        destination: &Path,
        access_token: &str,
    ) -> CloneResult;
}

/// Uploads a finished archive to remote object storage.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn upload(&self, target: &StorageTarget, file: &Path) -> UploadOutcome;
}
