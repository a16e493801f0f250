//! # refreshd Scheduler
//!
//! Owns the durable job registry and the trigger loop that dispatches
//! refresh runs at their configured times.
//!
//! ```text
//! JobStore (jobs.json)
//!   └── SchedulerService (1s tick)
//!         ├── TriggerTable: daily "HH:MM" → next_run
//!         ├── on fire → spawn task → per-path lease
//!         │               └── FallbackCoordinator::run(job) → JobResult
//!         └── JobResult channel → reporter task → Notifier
//! ```
//!
//! Firings for different jobs run fully concurrently; the per-path lease
//! guarantees at most one in-flight execution per target document.

pub mod dispatch;
pub mod service;
pub mod store;
pub mod triggers;

pub use dispatch::{PathLeases, execute_refresh, run_batch};
pub use service::SchedulerService;
pub use store::JobStore;
pub use triggers::{Trigger, TriggerTable, next_daily};
