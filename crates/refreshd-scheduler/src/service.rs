//! Scheduler service — owns the trigger table and the tick loop, and
//! fans each firing out as an independent concurrent task.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};

use refreshd_core::{Job, JobResult, Result, ScheduleTime};
use refreshd_engine::FallbackCoordinator;
use refreshd_notify::{Notifier, Reporter};

use crate::dispatch::{self, PathLeases};
use crate::store::JobStore;
use crate::triggers::{Trigger, TriggerTable};

pub struct SchedulerService {
    store: JobStore,
    coordinator: Arc<FallbackCoordinator>,
    reporter: Arc<Reporter>,
    notifier: Arc<dyn Notifier>,
    leases: PathLeases,
    triggers: Mutex<TriggerTable>,
    tick: Duration,
    results_tx: mpsc::UnboundedSender<(DateTime<Utc>, JobResult)>,
    results_rx: Mutex<Option<mpsc::UnboundedReceiver<(DateTime<Utc>, JobResult)>>>,
}

impl SchedulerService {
    pub fn new(
        store: JobStore,
        coordinator: FallbackCoordinator,
        reporter: Reporter,
        notifier: Arc<dyn Notifier>,
        tick_secs: u64,
    ) -> Arc<Self> {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            store,
            coordinator: Arc::new(coordinator),
            reporter: Arc::new(reporter),
            notifier,
            leases: PathLeases::new(),
            triggers: Mutex::new(TriggerTable::default()),
            tick: Duration::from_secs(tick_secs.max(1)),
            results_tx,
            results_rx: Mutex::new(Some(results_rx)),
        })
    }

    /// Read the store and register a daily trigger for every active
    /// job's schedule times. Returns the trigger count.
    pub async fn load_and_register(&self) -> Result<usize> {
        let jobs = self.store.load_or_empty()?;
        let table = TriggerTable::rebuild(&jobs, Utc::now());
        if table.is_empty() {
            tracing::warn!("No active triggers registered");
        }
        for trigger in table.iter() {
            tracing::info!(
                "📅 {} scheduled daily at {}",
                trigger.path.display(),
                trigger.at
            );
        }
        let count = table.len();
        *self.triggers.lock().await = table;
        Ok(count)
    }

    /// Atomically swap the trigger table for a fresh store read, so
    /// configuration edits take effect without a restart.
    pub async fn reload(&self) -> Result<usize> {
        tracing::info!("Reloading scheduler trigger table...");
        let count = self.load_and_register().await?;
        tracing::info!("Scheduler reloaded: {count} trigger(s)");
        Ok(count)
    }

    /// Foreground tick loop. Never returns; each due trigger spawns an
    /// independent task that is not awaited here.
    pub async fn run_forever(&self) {
        self.start_reporter().await;
        tracing::info!("⏰ Scheduler started (tick every {}s)", self.tick.as_secs());
        let mut interval = tokio::time::interval(self.tick);
        loop {
            interval.tick().await;
            let due = { self.triggers.lock().await.due(Utc::now()) };
            for trigger in due {
                tracing::info!(
                    "🔔 Trigger fired: {} (daily {})",
                    trigger.path.display(),
                    trigger.at
                );
                self.fire(trigger_job(&trigger));
            }
        }
    }

    /// Background variant, for embedding in a longer-lived host.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run_forever().await })
    }

    /// Out-of-band trigger for one document, e.g. from the CLI. Uses
    /// the configured backup when the path is a known job.
    pub async fn dispatch_now(&self, path: &Path) -> Result<()> {
        self.start_reporter().await;
        let job = self
            .store
            .find(path)?
            .unwrap_or_else(|| Job::new(path.to_path_buf()));
        tracing::info!("🔔 Manual dispatch: {}", job.path.display());
        self.fire(job);
        Ok(())
    }

    fn fire(&self, job: Job) {
        let coordinator = self.coordinator.clone();
        let leases = self.leases.clone();
        let results_tx = self.results_tx.clone();
        tokio::spawn(async move {
            let started = Utc::now();
            let Some(result) = dispatch::run_job(&coordinator, &leases, &job).await else {
                return;
            };
            if results_tx.send((started, result)).is_err() {
                tracing::warn!("Result channel closed; dropping job result");
            }
        });
    }

    /// Consume completed results and notify per run. Idempotent: the
    /// receiver is taken on first call.
    async fn start_reporter(&self) {
        let Some(mut rx) = self.results_rx.lock().await.take() else {
            return;
        };
        let reporter = self.reporter.clone();
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            while let Some((started, result)) = rx.recv().await {
                let summary =
                    reporter.compose(std::slice::from_ref(&result), started, Utc::now());
                if let Err(e) = notifier
                    .notify(&summary.subject, &summary.body, &summary.attachments)
                    .await
                {
                    tracing::warn!("Notifier failed (ignored): {e}");
                }
            }
        });
    }

    pub async fn trigger_count(&self) -> usize {
        self.triggers.lock().await.len()
    }

    /// Registered daily times for one job path.
    pub async fn registered_times(&self, path: &Path) -> Vec<ScheduleTime> {
        self.triggers.lock().await.times_for(path)
    }
}

fn trigger_job(trigger: &Trigger) -> Job {
    let mut job = Job::new(trigger.path.clone());
    job.backup = trigger.backup.clone();
    job
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::tests::{
        FlakyEngine, RecordingNotifier, coordinator, doc, quiet_reporter, scratch_dir,
    };

    fn service_for(
        dir: &Path,
        engine: Arc<FlakyEngine>,
        notifier: Arc<RecordingNotifier>,
    ) -> Arc<SchedulerService> {
        SchedulerService::new(
            JobStore::new(dir.join("jobs.json")),
            coordinator(engine),
            quiet_reporter(),
            notifier,
            1,
        )
    }

    #[tokio::test]
    async fn test_reload_removes_deactivated_job_only() {
        let dir = scratch_dir("svc-reload");
        let store = JobStore::new(dir.join("jobs.json"));
        let mut a = Job::new("/a.xlsx");
        a.schedule_times = vec![ScheduleTime::new(9, 0).unwrap()];
        let mut b = Job::new("/b.xlsx");
        b.schedule_times = vec![ScheduleTime::new(10, 30).unwrap()];
        store.upsert(a).unwrap();
        store.upsert(b).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let service = service_for(&dir, Arc::new(FlakyEngine::default()), notifier);
        assert_eq!(service.load_and_register().await.unwrap(), 2);

        store.set_active(Path::new("/b.xlsx"), false).unwrap();
        assert_eq!(service.reload().await.unwrap(), 1);

        assert!(service.registered_times(Path::new("/b.xlsx")).await.is_empty());
        assert_eq!(
            service.registered_times(Path::new("/a.xlsx")).await,
            vec![ScheduleTime::new(9, 0).unwrap()]
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_store_registers_nothing() {
        let dir = scratch_dir("svc-empty");
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service_for(&dir, Arc::new(FlakyEngine::default()), notifier);
        assert_eq!(service.load_and_register().await.unwrap(), 0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_concurrent_manual_dispatches_report_independently() {
        let dir = scratch_dir("svc-dispatch");
        let a = doc(&dir, "a.xlsx");
        let b = doc(&dir, "b.xlsx");
        let store = JobStore::new(dir.join("jobs.json"));
        store.upsert(Job::new(a.clone())).unwrap();
        store.upsert(Job::new(b.clone())).unwrap();

        let engine = Arc::new(FlakyEngine::default());
        engine.fail(&a);
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service_for(&dir, engine, notifier.clone());

        service.dispatch_now(&a).await.unwrap();
        service.dispatch_now(&b).await.unwrap();

        // both fire-and-forget tasks finish and report
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if notifier.sent.lock().unwrap().len() == 2 {
                break;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "timed out waiting for summaries"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let sent = notifier.sent.lock().unwrap();
        let mut subjects: Vec<&str> = sent.iter().map(|(s, _, _)| s.as_str()).collect();
        subjects.sort();
        assert!(subjects[0].contains("0 ok, 1 failed"));
        assert!(subjects[1].contains("1 ok, 0 failed"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
