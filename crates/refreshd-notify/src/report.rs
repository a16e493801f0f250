//! Result reporter — composes one summary per dispatch batch.
//!
//! Pure string composition; no branching logic beyond it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use refreshd_core::{Completion, JobResult, MailConfig};

/// A composed summary, ready for the notifier.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
    pub all_ok: bool,
}

pub struct Reporter {
    mail: MailConfig,
    capture_dir: PathBuf,
}

impl Reporter {
    pub fn new(mail: MailConfig, capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            mail,
            capture_dir: capture_dir.into(),
        }
    }

    pub fn compose(
        &self,
        results: &[JobResult],
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
    ) -> RunSummary {
        let ok = results.iter().filter(|r| r.status.is_ok()).count();
        let failed = results.len() - ok;
        let all_ok = failed == 0;

        let mut body = String::from("REFRESH RUN SUMMARY\n\n");
        for result in results {
            if result.status.is_ok() {
                body.push_str(&format!(
                    "✔ {}\n   Status: {}\n   Duration: {:.2}s\n",
                    result.job_path.display(),
                    result.status.label(),
                    result.duration_seconds,
                ));
                if let Some(refresh) = result.refresh_time_seconds {
                    body.push_str(&format!("   Refresh time: {refresh:.2}s\n"));
                }
                if let Some(backup) = &result.backup_path {
                    body.push_str(&format!("   Backup used: {}\n", backup.display()));
                }
                if result.completion == Some(Completion::TimedOut) {
                    body.push_str("   ⚠ Completed with timeout warning: the engine never reported idle before the wait ceiling\n");
                }
            } else {
                body.push_str(&format!(
                    "❌ {}\n   FAILED\n   Detail: {}\n   Fallback used: {}\n",
                    result.job_path.display(),
                    result.error_detail.as_deref().unwrap_or("unknown"),
                    result.used_backup,
                ));
            }
            body.push('\n');
        }

        let wall = (finished - started).num_milliseconds() as f64 / 1000.0;
        body.push_str(&format!(
            "Total run time: {wall:.2} seconds\nStarted: {started}\nFinished: {finished}\n"
        ));

        RunSummary {
            subject: format!("refreshd — refresh summary ({ok} ok, {failed} failed)"),
            body,
            attachments: self.collect_attachments(results, failed > 0),
            all_ok,
        }
    }

    fn collect_attachments(&self, results: &[JobResult], any_failed: bool) -> Vec<PathBuf> {
        let mut attachments = Vec::new();
        if self.mail.send_attachments {
            attachments.extend(
                results
                    .iter()
                    .filter_map(|r| r.refreshed_artifact())
                    .cloned(),
            );
        }
        if any_failed && self.mail.include_captures {
            attachments.extend(recent_captures(&self.capture_dir, 2));
        }
        let mut seen = HashSet::new();
        attachments.retain(|p| seen.insert(p.clone()));
        attachments
    }
}

/// The `n` most recent capture files, newest first.
fn recent_captures(dir: &Path, n: usize) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut captures: Vec<(std::time::SystemTime, PathBuf)> = entries
        .flatten()
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "png"))
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((modified, e.path()))
        })
        .collect();
    captures.sort_by(|a, b| b.0.cmp(&a.0));
    captures.into_iter().take(n).map(|(_, p)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use refreshd_core::JobStatus;

    fn ok_result(path: &str) -> JobResult {
        JobResult {
            job_path: path.into(),
            status: JobStatus::Ok,
            duration_seconds: 12.5,
            refresh_time_seconds: Some(8.25),
            used_backup: false,
            backup_path: None,
            completion: Some(Completion::Clean),
            error_detail: None,
        }
    }

    fn failed_result(path: &str) -> JobResult {
        JobResult {
            job_path: path.into(),
            status: JobStatus::Error,
            duration_seconds: 60.0,
            refresh_time_seconds: None,
            used_backup: false,
            backup_path: None,
            completion: None,
            error_detail: Some("Engine error: simulated".into()),
        }
    }

    fn reporter() -> Reporter {
        let mail = MailConfig {
            send_attachments: false,
            include_captures: false,
            ..MailConfig::default()
        };
        Reporter::new(mail, std::env::temp_dir().join("refreshd-no-captures"))
    }

    #[test]
    fn test_mixed_summary_lists_both_outcomes() {
        let results = vec![failed_result("/data/a.xlsx"), ok_result("/data/b.xlsx")];
        let now = Utc::now();
        let summary = reporter().compose(&results, now, now);

        assert!(!summary.all_ok);
        assert_eq!(summary.subject, "refreshd — refresh summary (1 ok, 1 failed)");
        assert!(summary.body.contains("❌ /data/a.xlsx"));
        assert!(summary.body.contains("Engine error: simulated"));
        assert!(summary.body.contains("✔ /data/b.xlsx"));
        assert!(summary.body.contains("Refresh time: 8.25s"));
    }

    #[test]
    fn test_backup_and_timeout_are_surfaced() {
        let mut result = ok_result("/data/c.xlsx");
        result.status = JobStatus::OkViaBackup;
        result.used_backup = true;
        result.backup_path = Some("/data/c_backup.xlsx".into());
        result.completion = Some(Completion::TimedOut);
        let now = Utc::now();
        let summary = reporter().compose(&[result], now, now);

        assert!(summary.all_ok);
        assert!(summary.body.contains("Status: OK (BACKUP)"));
        assert!(summary.body.contains("Backup used: /data/c_backup.xlsx"));
        assert!(summary.body.contains("timeout warning"));
    }

    #[test]
    fn test_attachments_only_for_refreshed_artifacts() {
        let mail = MailConfig {
            send_attachments: true,
            include_captures: false,
            ..MailConfig::default()
        };
        let reporter = Reporter::new(mail, std::env::temp_dir().join("refreshd-no-captures"));
        let results = vec![ok_result("/data/a.xlsx"), failed_result("/data/b.xlsx")];
        let now = Utc::now();
        let summary = reporter.compose(&results, now, now);
        assert_eq!(summary.attachments, vec![PathBuf::from("/data/a.xlsx")]);
    }
}
