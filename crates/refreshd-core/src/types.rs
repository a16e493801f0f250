//! Shared data model: jobs, refresh attempts, and job-level results.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RefreshdError;

/// A scheduled unit of refresh work.
///
/// Jobs are created and edited by the external configuration collaborator
/// (CLI or a hand-edited store file) and read by the scheduler. Execution
/// never mutates a job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Primary document to refresh. Unique key within the store.
    pub path: PathBuf,
    /// Optional fallback document, promoted when the primary exhausts
    /// its retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    /// Daily time-of-day triggers. A job with no times is loadable but
    /// never fires automatically. `horarios` is accepted for stores
    /// written by the legacy bot.
    #[serde(default, alias = "horarios")]
    pub schedule_times: Vec<ScheduleTime>,
    /// Inactive jobs are retained but never scheduled and excluded from
    /// ad-hoc refresh-all runs.
    #[serde(default = "default_active", alias = "activo")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Job {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup: None,
            schedule_times: Vec::new(),
            active: true,
        }
    }
}

/// A 24-hour wall-clock trigger time, serialized as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScheduleTime {
    pub hour: u8,
    pub minute: u8,
}

impl ScheduleTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, RefreshdError> {
        if hour > 23 || minute > 59 {
            return Err(RefreshdError::Config(format!(
                "invalid schedule time {hour:02}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ScheduleTime {
    type Err = RefreshdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| RefreshdError::Config(format!("invalid schedule time '{s}' (want HH:MM)")))?;
        let hour: u8 = h
            .trim()
            .parse()
            .map_err(|_| RefreshdError::Config(format!("invalid schedule time '{s}'")))?;
        let minute: u8 = m
            .trim()
            .parse()
            .map_err(|_| RefreshdError::Config(format!("invalid schedule time '{s}'")))?;
        Self::new(hour, minute)
    }
}

impl Serialize for ScheduleTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScheduleTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How the completion poll ended. A `TimedOut` completion still counts as
/// a successful attempt (the engine may report stale busy state), but it
/// is surfaced all the way into the run summary so stakeholders can tell
/// it apart from a clean completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Clean,
    TimedOut,
}

/// One successful execution of the state machine against one document
/// path. Immutable once finalized.
#[derive(Debug, Clone)]
pub struct RefreshAttempt {
    pub target_path: PathBuf,
    /// 1-based attempt number within the retry budget.
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Measured strictly around the refresh-invocation-to-completion
    /// window; excludes session startup, teardown, and validation.
    pub refresh_duration_seconds: f64,
    pub completion: Completion,
    /// Capture taken during an earlier failed attempt of the same call,
    /// if any.
    pub diagnostic_artifact: Option<PathBuf>,
}

/// Outcome class of one fallback-coordinated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Ok,
    OkViaBackup,
    Error,
}

impl JobStatus {
    pub fn is_ok(&self) -> bool {
        !matches!(self, JobStatus::Error)
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Ok => "OK",
            JobStatus::OkViaBackup => "OK (BACKUP)",
            JobStatus::Error => "ERROR",
        }
    }
}

/// Outcome of one fallback-coordinated run for one job. Produced once per
/// dispatch and consumed by the reporter; never persisted.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Always the primary path — the caller-facing identity of the job
    /// never changes even when the backup content satisfied it.
    pub job_path: PathBuf,
    pub status: JobStatus,
    /// Wall-clock duration of the whole run, primary and backup included.
    pub duration_seconds: f64,
    /// Refresh window of the attempt that succeeded, if any.
    pub refresh_time_seconds: Option<f64>,
    pub used_backup: bool,
    /// Set when the backup actually ran (successfully or not).
    pub backup_path: Option<PathBuf>,
    pub completion: Option<Completion>,
    /// Present iff status is Error.
    pub error_detail: Option<String>,
}

impl JobResult {
    /// Path of the artifact that was actually refreshed, for attachment.
    pub fn refreshed_artifact(&self) -> Option<&PathBuf> {
        match self.status {
            JobStatus::Ok => Some(&self.job_path),
            JobStatus::OkViaBackup => self.backup_path.as_ref(),
            JobStatus::Error => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_time_parse() {
        let t: ScheduleTime = "09:30".parse().unwrap();
        assert_eq!(t, ScheduleTime { hour: 9, minute: 30 });
        assert_eq!(t.to_string(), "09:30");
        assert!("24:00".parse::<ScheduleTime>().is_err());
        assert!("9".parse::<ScheduleTime>().is_err());
        assert!("aa:bb".parse::<ScheduleTime>().is_err());
    }

    #[test]
    fn test_job_roundtrip_and_defaults() {
        let json = r#"{"path": "/data/report.xlsx", "schedule_times": ["08:00", "17:45"]}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert!(job.active);
        assert!(job.backup.is_none());
        assert_eq!(job.schedule_times.len(), 2);
        assert_eq!(job.schedule_times[1].to_string(), "17:45");

        let back = serde_json::to_string(&job).unwrap();
        assert!(!back.contains("backup"));
    }

    #[test]
    fn test_refreshed_artifact() {
        let mut result = JobResult {
            job_path: "/data/a.xlsx".into(),
            status: JobStatus::OkViaBackup,
            duration_seconds: 1.0,
            refresh_time_seconds: Some(0.5),
            used_backup: true,
            backup_path: Some("/data/a_backup.xlsx".into()),
            completion: Some(Completion::Clean),
            error_detail: None,
        };
        assert_eq!(
            result.refreshed_artifact(),
            Some(&PathBuf::from("/data/a_backup.xlsx"))
        );
        result.status = JobStatus::Error;
        assert!(result.refreshed_artifact().is_none());
    }
}
