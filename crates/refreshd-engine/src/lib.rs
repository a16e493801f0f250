//! # refreshd Engine
//!
//! Drives one document through the external automation target:
//! lock-wait → engine session → refresh → completion-wait → validate →
//! retry, with backup fallback on retry exhaustion.
//!
//! The external engine is an opaque, stateful process with no reliable
//! cancellation or introspection beyond a busy flag. Every exit path
//! forces session teardown so engine processes are never leaked;
//! cleanup failures are swallowed.
//!
//! ```text
//! FallbackCoordinator::run(job)
//!   ├── Orchestrator::refresh(primary)
//!   │     ├── contention check (5 probes × 30s)
//!   │     └── attempt loop (×3, 15s apart)
//!   │           open → tune connections → refresh-all
//!   │           → poll busy (0.5s, ≤2h) → save+close → validate
//!   └── on exhaustion, same machine against job.backup
//! ```

pub mod capture;
pub mod engine;
pub mod fallback;
pub mod orchestrator;

pub use engine::{EngineSession, RefreshEngine, ShellEngine};
pub use fallback::FallbackCoordinator;
pub use orchestrator::Orchestrator;
