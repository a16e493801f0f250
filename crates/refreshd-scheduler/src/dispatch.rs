//! Dispatch — runs jobs through the fallback coordinator, guarded by
//! per-path leases, and hands the results to the reporter.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use refreshd_core::{Job, JobResult, Result};
use refreshd_engine::FallbackCoordinator;
use refreshd_notify::{Notifier, Reporter};

use crate::store::JobStore;

/// In-process registry of target paths with an execution in flight.
/// Enforces at most one orchestrator run per document at any time, on
/// top of the OS-level exclusive-open probe. Cheap to clone; clones
/// share the same registry.
#[derive(Clone, Default)]
pub struct PathLeases {
    inner: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for a path. `None` when a run is already in
    /// flight; the guard releases on drop.
    pub fn acquire(&self, path: &Path) -> Option<PathLease> {
        let mut held = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(path.to_path_buf()) {
            return None;
        }
        Some(PathLease {
            held: self.inner.clone(),
            path: path.to_path_buf(),
        })
    }
}

pub struct PathLease {
    held: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for PathLease {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.path);
    }
}

/// Run one job under its lease. `None` means the firing was skipped
/// because a run for the same document is already in flight — refresh is
/// idempotent, so the in-flight run already covers it.
pub async fn run_job(
    coordinator: &FallbackCoordinator,
    leases: &PathLeases,
    job: &Job,
) -> Option<JobResult> {
    let Some(_lease) = leases.acquire(&job.path) else {
        tracing::warn!(
            "{} already has a refresh in flight; skipping this firing",
            job.path.display()
        );
        return None;
    };
    Some(coordinator.run(job).await)
}

/// Run a batch sequentially. The external engine is a shared,
/// single-instance resource on the host, so sequential is the safe
/// default; one failing job never blocks the rest.
pub async fn run_batch(
    coordinator: &FallbackCoordinator,
    leases: &PathLeases,
    jobs: &[Job],
) -> Vec<JobResult> {
    let mut results = Vec::with_capacity(jobs.len());
    for job in jobs {
        if let Some(result) = run_job(coordinator, leases, job).await {
            results.push(result);
        }
    }
    results
}

/// Ad-hoc "refresh now" entry point: an explicit path list, or every
/// active job's primary paired with its configured backup. Composes the
/// summary and hands it to the notifier (best-effort), then returns the
/// full result list — individual failures never abort the batch.
pub async fn execute_refresh(
    store: &JobStore,
    coordinator: &FallbackCoordinator,
    leases: &PathLeases,
    reporter: &Reporter,
    notifier: &dyn Notifier,
    explicit: Option<Vec<PathBuf>>,
) -> Result<Vec<JobResult>> {
    let jobs: Vec<Job> = match explicit {
        Some(paths) => {
            let mut jobs = Vec::with_capacity(paths.len());
            for path in paths {
                // pick up the configured backup when the path is a known job
                let job = store
                    .find(&path)?
                    .unwrap_or_else(|| Job::new(path.clone()));
                jobs.push(job);
            }
            jobs
        }
        None => store
            .load()?
            .into_iter()
            .filter(|j| j.active)
            .collect(),
    };

    if jobs.is_empty() {
        tracing::info!("No active jobs to refresh");
        return Ok(Vec::new());
    }

    let started = Utc::now();
    let results = run_batch(coordinator, leases, &jobs).await;
    let summary = reporter.compose(&results, started, Utc::now());

    if let Err(e) = notifier
        .notify(&summary.subject, &summary.body, &summary.attachments)
        .await
    {
        tracing::warn!("Notifier failed (ignored): {e}");
    }
    tracing::info!("=== Refresh batch finished: {} ===", summary.subject);
    Ok(results)
}
