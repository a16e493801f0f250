//! Error taxonomy for the refresh pipeline.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RefreshdError>;

#[derive(Debug, Error)]
pub enum RefreshdError {
    /// Job store or configuration missing, unparseable, or invalid.
    /// Fatal to the calling operation; never retried.
    #[error("Config error: {0}")]
    Config(String),

    /// Target document held open by another process beyond the
    /// contention-wait bound. Skips the attempt loop entirely.
    #[error("Target busy: {0}")]
    ResourceBusy(String),

    /// The automation session failed during start/refresh/save/close
    /// across all permitted attempts. Carries the last underlying cause.
    #[error("Engine error: {0}")]
    Engine(String),

    /// Post-refresh artifact failed sanity checks (empty file,
    /// insufficient rows). Same retry/fallback treatment as Engine.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Notification delivery failed. Always caught and logged at the
    /// call site — never escalates into the refresh pipeline.
    #[error("Notify error: {0}")]
    Notify(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
