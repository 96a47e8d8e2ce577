//! One backup run: enumerate → clone fan-out → archive → upload.
//!
//! # Error handling
//! - Enumeration failures abort the run before anything is written.
//! - Clone failures stay in their job and end up in the [`BackupReport`].
//! - Archive failures abort the run; there is nothing to upload without one.
//! - Upload failures are recorded in the report only.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::archive::{self, ArchiveSummary};
use crate::config::RunContext;
use crate::contract::{ArchiveStore, CloneJob, Cloner, RepositoryLister, UploadOutcome};
use crate::error::BackupError;
use crate::orchestrate;

/// Everything a finished run produced.
#[derive(Debug)]
pub struct BackupReport {
    pub dispatched: usize,
    pub jobs: Vec<CloneJob>,
    pub archive: ArchiveSummary,
    /// `None` when no storage target was configured.
    pub upload: Option<UploadOutcome>,
}

impl BackupReport {
    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|j| j.succeeded()).count()
    }

    pub fn failed(&self) -> Vec<&CloneJob> {
        self.jobs.iter().filter(|j| !j.succeeded()).collect()
    }

    /// Clone and upload failures, in that order.
    pub fn errors(&self) -> Vec<BackupError> {
        self.jobs
            .iter()
            .filter_map(CloneJob::error)
            .chain(self.upload.as_ref().and_then(UploadOutcome::error))
            .collect()
    }
}

pub async fn backup<L, C, S>(
    ctx: &RunContext,
    access_token: &str,
    lister: &L,
    cloner: Arc<C>,
    store: Option<&S>,
) -> Result<BackupReport, BackupError>
where
    L: RepositoryLister + ?Sized,
    C: Cloner + 'static,
    S: ArchiveStore + ?Sized,
{
    info!("[BACKUP] Starting backup run");
    ctx.trace_loaded();

    let repositories = match lister.list_repositories(access_token).await {
        Ok(repositories) => repositories,
        Err(e) => {
            error!(error = %e, "[BACKUP][ERROR] Repository enumeration failed, nothing will be backed up");
            return Err(e);
        }
    };
    info!(count = repositories.len(), "[BACKUP] Repositories enumerated");

    let fan_out = orchestrate::run(
        repositories,
        ctx.name_filter.as_deref(),
        &ctx.destination_root,
        access_token,
        cloner,
        ctx.concurrency,
    )
    .await;

    if fan_out.dispatched == 0 {
        warn!("[BACKUP] No repositories selected; archiving an empty tree");
    }
    // The clone root only exists once a worker created it.
    tokio::fs::create_dir_all(&ctx.destination_root)
        .await
        .map_err(|e| BackupError::io("cannot create destination", &ctx.destination_root, e))?;

    println!("zipping repos at destination path....");
    let root = ctx.destination_root.clone();
    let out = ctx.archive_path.clone();
    let archive = tokio::task::spawn_blocking(move || archive::archive(&root, &out))
        .await
        .map_err(|e| BackupError::Archive(format!("archive task failed: {e}")))?
        .inspect_err(|e| error!(error = %e, "[BACKUP][ERROR] Archiving failed"))?;
    info!(
        path = %archive.path.display(),
        entries = archive.entries(),
        "[BACKUP] Archive ready"
    );

    let upload = match (&ctx.storage_target, store) {
        (Some(target), Some(store)) => {
            info!(bucket = %target.bucket, "[BACKUP][UPLOAD] Uploading archive");
            let outcome = store.upload(target, &archive.path).await;
            match &outcome {
                UploadOutcome::Succeeded { key } => {
                    info!(bucket = %target.bucket, %key, "[BACKUP][UPLOAD] Upload succeeded")
                }
                UploadOutcome::FailedRemote { code, message } => {
                    error!(bucket = %target.bucket, %code, %message, "[BACKUP][ERROR][UPLOAD] Storage service rejected upload")
                }
                UploadOutcome::FailedLocal(message) => {
                    error!(bucket = %target.bucket, %message, "[BACKUP][ERROR][UPLOAD] Upload failed before a response")
                }
            }
            Some(outcome)
        }
        (Some(target), None) => {
            warn!(bucket = %target.bucket, "[BACKUP][UPLOAD] No archive store available, upload skipped");
            None
        }
        (None, _) => None,
    };

    Ok(BackupReport {
        dispatched: fan_out.dispatched,
        jobs: fan_out.jobs,
        archive,
        upload,
    })
}
