//! Daily trigger math and the in-memory trigger table.
//! Trigger times are interpreted in UTC; all functions are pure over a
//! passed-in `now` so they stay testable.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};

use refreshd_core::{Job, ScheduleTime};

/// One registered daily firing for one job.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
    pub at: ScheduleTime,
    pub next_run: DateTime<Utc>,
}

/// Next occurrence of `at` strictly after `after`.
pub fn next_daily(at: ScheduleTime, after: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = after
        .date_naive()
        .and_hms_opt(at.hour.into(), at.minute.into(), 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(after);
    if candidate > after {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

/// The scheduler-owned registry of upcoming firings, derived from the
/// job store. Rebuilt wholesale on reload.
#[derive(Debug, Default)]
pub struct TriggerTable {
    triggers: Vec<Trigger>,
}

impl TriggerTable {
    pub fn rebuild(jobs: &[Job], now: DateTime<Utc>) -> Self {
        let mut triggers = Vec::new();
        for job in jobs.iter().filter(|j| j.active) {
            for &at in &job.schedule_times {
                triggers.push(Trigger {
                    path: job.path.clone(),
                    backup: job.backup.clone(),
                    at,
                    next_run: next_daily(at, now),
                });
            }
        }
        Self { triggers }
    }

    /// Pop every trigger due at `now`, advancing each to its next day.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<Trigger> {
        let mut fired = Vec::new();
        for trigger in self.triggers.iter_mut() {
            if trigger.next_run <= now {
                fired.push(trigger.clone());
                trigger.next_run = next_daily(trigger.at, now);
            }
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter()
    }

    /// Registered times for one job path (reload assertions, CLI listing).
    pub fn times_for(&self, path: &Path) -> Vec<ScheduleTime> {
        self.triggers
            .iter()
            .filter(|t| t.path == path)
            .map(|t| t.at)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u8, m: u8) -> ScheduleTime {
        ScheduleTime::new(h, m).unwrap()
    }

    #[test]
    fn test_next_daily_today_and_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 2, 22, 7, 0, 0).unwrap();
        let next = next_daily(at(9, 0), now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 22, 9, 0, 0).unwrap());

        // already past today → tomorrow
        let next = next_daily(at(6, 30), now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 23, 6, 30, 0).unwrap());

        // exactly now → tomorrow (strictly after)
        let next = next_daily(at(7, 0), now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 23, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_rebuild_skips_inactive_and_unscheduled() {
        let now = Utc.with_ymd_and_hms(2026, 2, 22, 0, 0, 0).unwrap();
        let mut a = Job::new("/a.xlsx");
        a.schedule_times = vec![at(9, 0), at(17, 0)];
        let mut b = Job::new("/b.xlsx");
        b.schedule_times = vec![at(9, 0)];
        b.active = false;
        let c = Job::new("/c.xlsx"); // no times → never fires

        let table = TriggerTable::rebuild(&[a, b, c], now);
        assert_eq!(table.len(), 2);
        assert!(table.times_for(Path::new("/b.xlsx")).is_empty());
        assert!(table.times_for(Path::new("/c.xlsx")).is_empty());
    }

    #[test]
    fn test_due_fires_once_then_advances() {
        let registered = Utc.with_ymd_and_hms(2026, 2, 22, 8, 0, 0).unwrap();
        let mut job = Job::new("/a.xlsx");
        job.schedule_times = vec![at(9, 0)];
        let mut table = TriggerTable::rebuild(&[job], registered);

        let before = Utc.with_ymd_and_hms(2026, 2, 22, 8, 59, 59).unwrap();
        assert!(table.due(before).is_empty());

        let nine = Utc.with_ymd_and_hms(2026, 2, 22, 9, 0, 0).unwrap();
        let fired = table.due(nine);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].path, Path::new("/a.xlsx"));

        // not due again until tomorrow
        assert!(table.due(nine + Duration::seconds(30)).is_empty());
        let tomorrow = Utc.with_ymd_and_hms(2026, 2, 23, 9, 0, 0).unwrap();
        assert_eq!(table.due(tomorrow).len(), 1);
    }
}
