//! Run-summary composition and out-of-band delivery.
//!
//! Delivery is strictly best-effort: a notifier failure is logged by the
//! caller and never propagates into the refresh pipeline.

pub mod mailer;
pub mod report;

pub use mailer::{NoopNotifier, Notifier, SmtpNotifier};
pub use report::{Reporter, RunSummary};
