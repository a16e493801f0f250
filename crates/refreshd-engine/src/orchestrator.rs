//! Refresh Orchestrator — drives one document through the engine session
//! state machine: lock-wait → session → refresh → completion-wait →
//! validate → retry.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use refreshd_core::{Completion, EngineConfig, RefreshAttempt, RefreshdError, Result};

use crate::capture;
use crate::engine::{EngineSession, RefreshEngine};

pub struct Orchestrator {
    engine: Arc<dyn RefreshEngine>,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn RefreshEngine>, config: EngineConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the full state machine against one document path.
    ///
    /// Returns the successful attempt, or fails with `ResourceBusy`
    /// (contention bound exhausted, zero sessions started) or `Engine`
    /// (all permitted attempts failed, carrying the last cause).
    pub async fn refresh(&self, target: &Path) -> Result<RefreshAttempt> {
        tracing::info!("Starting refresh of {}", target.display());
        self.wait_for_access(target).await?;

        if !target.exists() {
            return Err(RefreshdError::Engine(format!(
                "target does not exist: {}",
                target.display()
            )));
        }

        let mut last_err: Option<RefreshdError> = None;
        let mut last_capture: Option<PathBuf> = None;

        for attempt in 1..=self.config.max_retries {
            tracing::info!(
                "Attempt {attempt}/{} for {}",
                self.config.max_retries,
                target.display()
            );
            match self.run_attempt(target, attempt).await {
                Ok(mut finished) => {
                    finished.diagnostic_artifact = last_capture;
                    tracing::info!(
                        "✅ {} refreshed in {:.2}s (attempt {attempt})",
                        target.display(),
                        finished.refresh_duration_seconds
                    );
                    return Ok(finished);
                }
                Err(e) => {
                    tracing::error!("Attempt {attempt} failed for {}: {e}", target.display());
                    if self.config.screenshot_on_error {
                        let label = format!("error_attempt_{attempt}");
                        if let Some(shot) = capture::capture_failure(&self.config, &label).await {
                            last_capture = Some(shot);
                        }
                    }
                    last_err = Some(e);
                    if attempt < self.config.max_retries {
                        tracing::info!(
                            "Waiting {}s before next attempt...",
                            self.config.retry_interval_secs
                        );
                        tokio::time::sleep(Duration::from_secs(self.config.retry_interval_secs))
                            .await;
                    }
                }
            }
        }

        let cause = match last_err {
            Some(e) => e.to_string(),
            None => "no refresh attempts permitted (max_retries = 0)".into(),
        };
        let capture_note = last_capture
            .map(|p| format!(" (capture: {})", p.display()))
            .unwrap_or_default();
        Err(RefreshdError::Engine(format!(
            "all {} attempts failed for {}: {cause}{capture_note}",
            self.config.max_retries,
            target.display()
        )))
    }

    /// Contention check: probe exclusive access up to the configured
    /// bound. No retry budget is spent here and no session is started.
    async fn wait_for_access(&self, target: &Path) -> Result<()> {
        let probes = self.config.lock_probes.max(1);
        for probe in 1..=probes {
            if !self.engine.is_locked(target) {
                return Ok(());
            }
            if probe < probes {
                tracing::warn!(
                    "{} is held by another process; probe {probe}/{probes}, waiting {}s...",
                    target.display(),
                    self.config.lock_wait_secs
                );
                tokio::time::sleep(Duration::from_secs(self.config.lock_wait_secs)).await;
            }
        }
        Err(RefreshdError::ResourceBusy(format!(
            "{} still locked after {probes} probes; close it so the refresh can run",
            target.display()
        )))
    }

    /// One engine-session attempt. The session is torn down on every
    /// exit path; teardown failures are swallowed.
    async fn run_attempt(&self, target: &Path, attempt: u32) -> Result<RefreshAttempt> {
        let started_at = Utc::now();
        let mut session = self.engine.open(target).await?;

        match self.drive(session.as_mut(), target).await {
            Ok((refresh_secs, completion)) => {
                self.validate(target)?;
                Ok(RefreshAttempt {
                    target_path: target.to_path_buf(),
                    attempt_number: attempt,
                    started_at,
                    ended_at: Utc::now(),
                    refresh_duration_seconds: refresh_secs,
                    completion,
                    diagnostic_artifact: None,
                })
            }
            Err(e) => {
                session.force_quit().await;
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        session: &mut dyn EngineSession,
        target: &Path,
    ) -> Result<(f64, Completion)> {
        // Heavy data connections complete asynchronously by default;
        // without this the refresh call returns before computation ends
        // and there is no reliable completion signal.
        if let Err(e) = session.disable_background_refresh().await {
            tracing::warn!("Could not tune data connections for {}: {e}", target.display());
        }

        tracing::info!("Running refresh-all on {}", target.display());
        let t0 = Instant::now();
        session.refresh_all().await?;
        let completion = self.wait_for_idle(session).await?;
        let refresh_secs = t0.elapsed().as_secs_f64();

        session.save_and_close().await?;
        Ok((refresh_secs, completion))
    }

    /// Poll the engine's busy state until idle or the ceiling. Ceiling
    /// breach is tolerated — the engine may report stale busy state —
    /// but named, so it is never mistaken for a clean completion.
    async fn wait_for_idle(&self, session: &mut dyn EngineSession) -> Result<Completion> {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let ceiling = Duration::from_secs(self.config.poll_ceiling_secs);
        let start = Instant::now();
        loop {
            if !session.is_busy().await? {
                return Ok(Completion::Clean);
            }
            if start.elapsed() >= ceiling {
                tracing::warn!(
                    "Engine still busy after {}s ceiling; proceeding to save anyway",
                    self.config.poll_ceiling_secs
                );
                return Ok(Completion::TimedOut);
            }
            tokio::time::sleep(poll).await;
        }
    }

    fn validate(&self, target: &Path) -> Result<()> {
        let size = std::fs::metadata(target)?.len();
        if size == 0 {
            return Err(RefreshdError::Validation(format!(
                "{} is empty after refresh",
                target.display()
            )));
        }
        tracing::debug!("Artifact has {size} bytes after refresh");

        if self.config.validate_rows {
            let rows = self.engine.sheet_rows(target)?;
            if rows < self.config.min_rows_expected {
                return Err(RefreshdError::Validation(format!(
                    "active sheet of {} has {rows} rows, expected at least {}",
                    target.display(),
                    self.config.min_rows_expected
                )));
            }
            tracing::debug!("Row validation OK: {rows} rows");
        }
        Ok(())
    }
}
