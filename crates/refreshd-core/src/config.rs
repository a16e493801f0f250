//! refreshd configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RefreshdError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshdConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

impl RefreshdConfig {
    /// Load config from the default path (~/.refreshd/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RefreshdError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RefreshdError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RefreshdError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the refreshd home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".refreshd")
    }
}

/// Engine session and orchestration tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine-session attempts per refresh call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Sleep between failed attempts.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
    /// Exclusive-open probes before giving up on a contended target.
    #[serde(default = "default_lock_probes")]
    pub lock_probes: u32,
    /// Wait between contention probes.
    #[serde(default = "default_lock_wait")]
    pub lock_wait_secs: u64,
    /// Busy-state poll interval during the completion wait.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Ceiling on the completion wait. Breach is tolerated (the engine
    /// may report stale busy state) but flagged in the run summary.
    #[serde(default = "default_poll_ceiling")]
    pub poll_ceiling_secs: u64,
    /// Reopen the artifact after refresh and check the active sheet's
    /// row count.
    #[serde(default)]
    pub validate_rows: bool,
    #[serde(default = "default_min_rows")]
    pub min_rows_expected: u64,
    /// Capture a desktop screenshot when an attempt fails.
    #[serde(default = "bool_true")]
    pub screenshot_on_error: bool,
    /// Where failure captures land.
    #[serde(default = "default_capture_dir")]
    pub capture_dir: String,
    /// Host screenshot command, `{path}` is replaced with the output
    /// file. Unset disables capture regardless of `screenshot_on_error`.
    #[serde(default)]
    pub capture_cmd: Option<String>,
    #[serde(default)]
    pub commands: EngineCommands,
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_interval() -> u64 {
    15
}
fn default_lock_probes() -> u32 {
    5
}
fn default_lock_wait() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    500
}
fn default_poll_ceiling() -> u64 {
    7200
}
fn default_min_rows() -> u64 {
    1
}
fn bool_true() -> bool {
    true
}
fn default_capture_dir() -> String {
    "logs/screenshots".into()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_interval_secs: default_retry_interval(),
            lock_probes: default_lock_probes(),
            lock_wait_secs: default_lock_wait(),
            poll_interval_ms: default_poll_interval(),
            poll_ceiling_secs: default_poll_ceiling(),
            validate_rows: false,
            min_rows_expected: default_min_rows(),
            screenshot_on_error: true,
            capture_dir: default_capture_dir(),
            capture_cmd: None,
            commands: EngineCommands::default(),
        }
    }
}

/// Command templates that drive the external document engine. `{path}`
/// is replaced with the target document. These are host-specific: they
/// point at whatever launches the engine headless, triggers its
/// refresh-all macro, and persists the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineCommands {
    /// Launches the engine with the document, non-interactive and
    /// alert-suppressed. Required.
    #[serde(default)]
    pub launch: String,
    /// Forces every data connection to synchronous completion before
    /// the refresh. Optional; a failure here is logged, not fatal.
    #[serde(default)]
    pub tune: Option<String>,
    /// Issues the engine's refresh-all operation. Required.
    #[serde(default)]
    pub refresh: String,
    /// Persists the document. Optional when the refresh command saves.
    #[serde(default)]
    pub save: Option<String>,
}

/// Scheduler loop tuning and job store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Trigger poll resolution.
    #[serde(default = "default_tick")]
    pub tick_secs: u64,
    /// Job store file. `~` is expanded by the binary.
    #[serde(default = "default_jobs_path")]
    pub jobs_path: String,
}

fn default_tick() -> u64 {
    1
}
fn default_jobs_path() -> String {
    "~/.refreshd/jobs.json".into()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick(),
            jobs_path: default_jobs_path(),
        }
    }
}

/// Outbound mail settings for run summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Attach successfully refreshed artifacts to the summary.
    #[serde(default = "bool_true")]
    pub send_attachments: bool,
    /// Attach the most recent failure captures when any job failed.
    #[serde(default = "bool_true")]
    pub include_captures: bool,
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            from: String::new(),
            password: String::new(),
            to: Vec::new(),
            display_name: None,
            send_attachments: true,
            include_captures: true,
        }
    }
}
