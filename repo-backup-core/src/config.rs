use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::contract::StorageTarget;

/// Immutable settings for one backup run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Unix seconds at start-up; suffixes both the clone directory and the archive.
    pub timestamp: u64,
    pub destination_root: PathBuf,
    pub archive_path: PathBuf,
    pub name_filter: Option<String>,
    pub storage_target: Option<StorageTarget>,
    /// Upper bound on simultaneous clones. `None` runs one clone per repository at once.
    pub concurrency: Option<usize>,
}

impl RunContext {
    /// Builds the context for a run started at `timestamp`.
    ///
    /// The destination directory is `<destination_prefix><timestamp>` and the
    /// archive `<archive_prefix><timestamp>.zip`, so repeated runs never collide.
    pub fn new(
        timestamp: u64,
        destination_prefix: &str,
        archive_prefix: &str,
        name_filter: Option<String>,
        storage_target: Option<StorageTarget>,
        concurrency: Option<usize>,
    ) -> Self {
        Self {
            timestamp,
            destination_root: PathBuf::from(format!("{destination_prefix}{timestamp}")),
            archive_path: PathBuf::from(format!("{archive_prefix}{timestamp}.zip")),
            name_filter: name_filter.filter(|f| !f.is_empty()),
            storage_target,
            concurrency: concurrency.filter(|n| *n > 0),
        }
    }

    /// Same as [`RunContext::new`], stamped with the current time.
    pub fn now(
        destination_prefix: &str,
        archive_prefix: &str,
        name_filter: Option<String>,
        storage_target: Option<StorageTarget>,
        concurrency: Option<usize>,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self::new(
            timestamp,
            destination_prefix,
            archive_prefix,
            name_filter,
            storage_target,
            concurrency,
        )
    }

    pub fn trace_loaded(&self) {
        info!(
            destination_root = %self.destination_root.display(),
            archive = %self.archive_path.display(),
            filter = self.name_filter.as_deref().unwrap_or(""),
            bucket = self.storage_target.as_ref().map(|t| t.bucket.as_str()).unwrap_or(""),
            concurrency = ?self.concurrency,
            "Loaded RunContext"
        );
        debug!(?self, "RunContext loaded (full debug)");
    }
}
