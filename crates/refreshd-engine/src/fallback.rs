//! Fallback coordination — runs the primary document, promotes the
//! backup when the primary exhausts its retries, and merges the two
//! outcomes into one job-level result.

use std::time::Instant;

use refreshd_core::{Job, JobResult, JobStatus};

use crate::orchestrator::Orchestrator;

/// Wraps the orchestrator with the primary/backup policy. Retry
/// exhaustion happens inside the orchestrator; this component never
/// retries across the primary/backup boundary more than once each.
pub struct FallbackCoordinator {
    orchestrator: Orchestrator,
}

impl FallbackCoordinator {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Run one job to a `JobResult`. Never fails — every failure mode
    /// is folded into the result for the reporter.
    pub async fn run(&self, job: &Job) -> JobResult {
        let t0 = Instant::now();

        match self.orchestrator.refresh(&job.path).await {
            Ok(attempt) => JobResult {
                job_path: job.path.clone(),
                status: JobStatus::Ok,
                duration_seconds: t0.elapsed().as_secs_f64(),
                refresh_time_seconds: Some(attempt.refresh_duration_seconds),
                used_backup: false,
                backup_path: None,
                completion: Some(attempt.completion),
                error_detail: None,
            },
            Err(primary_err) => {
                tracing::error!("Primary {} failed: {primary_err}", job.path.display());
                let Some(backup) = &job.backup else {
                    return JobResult {
                        job_path: job.path.clone(),
                        status: JobStatus::Error,
                        duration_seconds: t0.elapsed().as_secs_f64(),
                        refresh_time_seconds: None,
                        used_backup: false,
                        backup_path: None,
                        completion: None,
                        error_detail: Some(primary_err.to_string()),
                    };
                };

                tracing::info!(
                    "Trying backup {} for {}",
                    backup.display(),
                    job.path.display()
                );
                match self.orchestrator.refresh(backup).await {
                    Ok(attempt) => JobResult {
                        // caller-facing identity stays the primary
                        job_path: job.path.clone(),
                        status: JobStatus::OkViaBackup,
                        duration_seconds: t0.elapsed().as_secs_f64(),
                        refresh_time_seconds: Some(attempt.refresh_duration_seconds),
                        used_backup: true,
                        backup_path: Some(backup.clone()),
                        completion: Some(attempt.completion),
                        error_detail: None,
                    },
                    Err(backup_err) => {
                        tracing::error!("Backup {} also failed: {backup_err}", backup.display());
                        JobResult {
                            job_path: job.path.clone(),
                            status: JobStatus::Error,
                            duration_seconds: t0.elapsed().as_secs_f64(),
                            refresh_time_seconds: None,
                            used_backup: true,
                            backup_path: Some(backup.clone()),
                            completion: None,
                            error_detail: Some(format!(
                                "Primary: {primary_err} | Backup: {backup_err}"
                            )),
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::tests::{Behavior, MockEngine, fast_config, scratch_doc};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn coordinator(engine: Arc<MockEngine>) -> FallbackCoordinator {
        FallbackCoordinator::new(Orchestrator::new(engine, fast_config()))
    }

    #[tokio::test]
    async fn test_primary_failure_without_backup() {
        let doc = scratch_doc("fb-no-backup.xlsx");
        let engine = Arc::new(MockEngine::default());
        engine.script(
            &doc,
            Behavior {
                fail_refresh: true,
                ..Behavior::default()
            },
        );
        let job = Job::new(&doc);

        let result = coordinator(engine).run(&job).await;
        assert_eq!(result.status, JobStatus::Error);
        assert!(!result.used_backup);
        assert!(result.error_detail.is_some());
        assert!(!result.status.is_ok());
    }

    #[tokio::test]
    async fn test_backup_success_keeps_primary_identity() {
        let primary = scratch_doc("fb-primary.xlsx");
        let backup = scratch_doc("fb-backup.xlsx");
        let engine = Arc::new(MockEngine::default());
        engine.script(
            &primary,
            Behavior {
                fail_refresh: true,
                ..Behavior::default()
            },
        );
        let mut job = Job::new(&primary);
        job.backup = Some(backup.clone());

        let result = coordinator(engine).run(&job).await;
        assert_eq!(result.status, JobStatus::OkViaBackup);
        assert!(result.used_backup);
        assert_eq!(result.job_path, primary);
        assert_eq!(result.backup_path.as_deref(), Some(backup.as_path()));
        assert_eq!(result.refreshed_artifact(), Some(&backup));
        assert!(result.status.is_ok());
    }

    #[tokio::test]
    async fn test_double_failure_concatenates_causes() {
        let primary = scratch_doc("fb-both-primary.xlsx");
        let backup = scratch_doc("fb-both-backup.xlsx");
        let engine = Arc::new(MockEngine::default());
        engine.script(
            &primary,
            Behavior {
                fail_refresh: true,
                ..Behavior::default()
            },
        );
        engine.script(
            &backup,
            Behavior {
                fail_refresh: true,
                ..Behavior::default()
            },
        );
        let mut job = Job::new(&primary);
        job.backup = Some(backup);

        let result = coordinator(engine).run(&job).await;
        assert_eq!(result.status, JobStatus::Error);
        assert!(result.used_backup);
        let detail = result.error_detail.unwrap();
        assert!(detail.starts_with("Primary: "));
        assert!(detail.contains(" | Backup: "));
    }

    #[tokio::test]
    async fn test_busy_primary_still_tries_backup() {
        let primary = scratch_doc("fb-busy-primary.xlsx");
        let backup = scratch_doc("fb-busy-backup.xlsx");
        let engine = Arc::new(MockEngine::default());
        engine.script(
            &primary,
            Behavior {
                locked: true,
                ..Behavior::default()
            },
        );
        let mut job = Job::new(&primary);
        job.backup = Some(backup);

        let result = coordinator(engine.clone()).run(&job).await;
        // ResourceBusy on the primary is still eligible for fallback
        assert_eq!(result.status, JobStatus::OkViaBackup);
        // the locked primary never got a session
        assert_eq!(engine.opens.load(Ordering::SeqCst), 1);
    }
}
