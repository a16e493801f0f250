//! Job store — flat JSON registry of job definitions.
//! Human-editable and git-friendly; rewritten whole on every mutation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use refreshd_core::{Job, RefreshdError, Result};

pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default store path (~/.refreshd/jobs.json).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".refreshd")
            .join("jobs.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full job list. Strict: a missing or unparseable file is
    /// a `Config` error, as is a structurally invalid job list.
    pub fn load(&self) -> Result<Vec<Job>> {
        if !self.path.exists() {
            return Err(RefreshdError::Config(format!(
                "job store not found: {}",
                self.path.display()
            )));
        }
        let content = std::fs::read_to_string(&self.path)?;
        let jobs: Vec<Job> = serde_json::from_str(&content).map_err(|e| {
            RefreshdError::Config(format!("cannot parse {}: {e}", self.path.display()))
        })?;
        validate(&jobs)?;
        Ok(jobs)
    }

    /// Tolerant load for the scheduler: a missing file is an empty list
    /// (an empty active set is a no-op, not an error).
    pub fn load_or_empty(&self) -> Result<Vec<Job>> {
        if !self.path.exists() {
            tracing::warn!("Job store {} not found; no jobs", self.path.display());
            return Ok(Vec::new());
        }
        self.load()
    }

    pub fn active_jobs(&self) -> Result<Vec<Job>> {
        Ok(self
            .load_or_empty()?
            .into_iter()
            .filter(|j| j.active)
            .collect())
    }

    /// Find one job by its primary path.
    pub fn find(&self, path: &Path) -> Result<Option<Job>> {
        Ok(self.load_or_empty()?.into_iter().find(|j| j.path == path))
    }

    /// Insert or replace a job, keyed by primary path.
    pub fn upsert(&self, job: Job) -> Result<()> {
        let mut jobs = self.load_or_empty()?;
        match jobs.iter_mut().find(|j| j.path == job.path) {
            Some(existing) => *existing = job,
            None => jobs.push(job),
        }
        validate(&jobs)?;
        self.save(&jobs)
    }

    /// Remove a job by primary path. Returns whether it existed.
    pub fn remove(&self, path: &Path) -> Result<bool> {
        let mut jobs = self.load_or_empty()?;
        let before = jobs.len();
        jobs.retain(|j| j.path != path);
        let removed = jobs.len() < before;
        if removed {
            self.save(&jobs)?;
        }
        Ok(removed)
    }

    /// Toggle the active flag. Returns whether the job existed.
    pub fn set_active(&self, path: &Path, active: bool) -> Result<bool> {
        let mut jobs = self.load_or_empty()?;
        let Some(job) = jobs.iter_mut().find(|j| j.path == path) else {
            return Ok(false);
        };
        job.active = active;
        self.save(&jobs)?;
        Ok(true)
    }

    fn save(&self, jobs: &[Job]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(jobs)
            .map_err(|e| RefreshdError::Config(format!("serialize jobs: {e}")))?;
        std::fs::write(&self.path, json)?;
        tracing::debug!("Saved {} jobs to {}", jobs.len(), self.path.display());
        Ok(())
    }
}

fn validate(jobs: &[Job]) -> Result<()> {
    let mut seen = HashSet::new();
    for job in jobs {
        if job.path.as_os_str().is_empty() {
            return Err(RefreshdError::Config("job with empty primary path".into()));
        }
        if !seen.insert(&job.path) {
            return Err(RefreshdError::Config(format!(
                "duplicate job path: {}",
                job.path.display()
            )));
        }
    }
    Ok(())
}
