//! Diagnostic capture — best-effort desktop screenshot on failure.
//!
//! Capture failures are logged and swallowed; the refresh pipeline's
//! correctness never depends on a screenshot landing.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::Utc;
use tokio::process::Command;

use refreshd_core::EngineConfig;

/// Run the configured capture command, returning the capture path on
/// success. `None` when capture is unconfigured or the command failed.
pub async fn capture_failure(config: &EngineConfig, label: &str) -> Option<PathBuf> {
    let template = config.capture_cmd.as_deref()?;
    let dir = Path::new(&config.capture_dir);
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::warn!("Could not create capture dir {}: {e}", dir.display());
        return None;
    }
    let file = dir.join(format!("{label}_{}.png", Utc::now().format("%Y%m%d_%H%M%S")));

    let mut parts = template.split_whitespace();
    let program = parts.next()?;
    let mut cmd = Command::new(program);
    for arg in parts {
        if arg == "{path}" {
            cmd.arg(&file);
        } else {
            cmd.arg(arg);
        }
    }
    cmd.stdout(Stdio::null()).stderr(Stdio::null());

    match cmd.status().await {
        Ok(status) if status.success() => {
            tracing::info!("📸 Capture saved: {}", file.display());
            Some(file)
        }
        Ok(status) => {
            tracing::warn!("Capture command exited with {status}");
            None
        }
        Err(e) => {
            tracing::warn!("Could not take capture: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_capture_is_none() {
        let config = EngineConfig::default();
        assert!(capture_failure(&config, "error").await.is_none());
    }

    #[tokio::test]
    async fn test_capture_writes_file() {
        let dir = std::env::temp_dir().join("refreshd-capture-test");
        let config = EngineConfig {
            capture_cmd: Some("touch {path}".into()),
            capture_dir: dir.to_string_lossy().into_owned(),
            ..EngineConfig::default()
        };
        let file = capture_failure(&config, "error_attempt_1").await.unwrap();
        assert!(file.exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
