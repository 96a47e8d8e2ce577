//! Fan-out of clone workers and the join that gates archiving.
//!
//! Every selected repository gets its own tokio task. The call returns only
//! after every dispatched task has finished, successfully or not, so a caller
//! never observes a half-written clone tree.

use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::contract::{CloneJob, CloneResult, Cloner, RepositoryDescriptor};

/// All jobs of one fan-out, each in a terminal state.
#[derive(Debug)]
pub struct FanOut {
    /// Number of workers dispatched; always equals `jobs.len()`.
    pub dispatched: usize,
    pub jobs: Vec<CloneJob>,
}

impl FanOut {
    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|j| j.succeeded()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &CloneJob> {
        self.jobs.iter().filter(|j| !j.succeeded())
    }
}

/// Keeps the descriptors whose short name contains `filter`.
/// An absent or empty filter keeps everything. Order is preserved.
pub fn select_repositories(
    descriptors: Vec<RepositoryDescriptor>,
    filter: Option<&str>,
) -> Vec<RepositoryDescriptor> {
    match filter {
        Some(f) if !f.is_empty() => descriptors
            .into_iter()
            .filter(|d| d.name.contains(f))
            .collect(),
        _ => descriptors,
    }
}

/// Clones every selected repository under `destination_root` concurrently.
///
/// With `concurrency` unset, all clones run at once. With a limit, all jobs
/// are still dispatched immediately but at most `limit` clone at a time.
pub async fn run<C>(
    descriptors: Vec<RepositoryDescriptor>,
    filter: Option<&str>,
    destination_root: &Path,
    access_token: &str,
    cloner: Arc<C>,
    concurrency: Option<usize>,
) -> FanOut
where
    C: Cloner + 'static,
{
    let selected = select_repositories(descriptors, filter);
    let permits = concurrency.map(|limit| Arc::new(Semaphore::new(limit.max(1))));

    info!(
        selected = selected.len(),
        filter = filter.unwrap_or(""),
        limit = ?concurrency,
        root = %destination_root.display(),
        "Dispatching clone workers"
    );

    let spawned: Vec<_> = selected
        .into_iter()
        .map(|descriptor| {
            let mut job = CloneJob::new(descriptor, destination_root);
            let cloner = Arc::clone(&cloner);
            let token = access_token.to_string();
            let permits = permits.clone();
            let pending = job.clone();
            let handle = tokio::spawn(async move {
                let _permit = match permits {
                    Some(sem) => match sem.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(e) => {
                            job.result = CloneResult::Failed(format!("worker pool closed: {e}"));
                            return job;
                        }
                    },
                    None => None,
                };
                job.result = cloner
                    .clone_repository(&job.descriptor.clone_url, &job.destination, &token)
                    .await;
                job
            });
            (pending, handle)
        })
        .collect();

    let dispatched = spawned.len();
    let (pending, handles): (Vec<CloneJob>, Vec<_>) = spawned.into_iter().unzip();

    let jobs: Vec<CloneJob> = join_all(handles)
        .await
        .into_iter()
        .zip(pending)
        .map(|(joined, mut pending)| match joined {
            Ok(job) => job,
            Err(e) => {
                error!(
                    repository = %pending.descriptor.full_name,
                    error = ?e,
                    "Clone worker did not complete"
                );
                pending.result = CloneResult::Failed(format!("clone worker aborted: {e}"));
                pending
            }
        })
        .collect();

    debug_assert!(jobs.iter().all(|j| j.result.is_terminal()));

    let fan_out = FanOut { dispatched, jobs };
    for job in fan_out.failed() {
        if let CloneResult::Failed(message) = &job.result {
            warn!(
                repository = %job.descriptor.full_name,
                path = %job.destination.display(),
                error = %message,
                "Repository was not backed up"
            );
        }
    }
    debug!(dispatched, "All clone workers joined");
    info!(
        dispatched,
        succeeded = fan_out.succeeded(),
        failed = dispatched - fan_out.succeeded(),
        "Clone fan-out complete"
    );
    fan_out
}
