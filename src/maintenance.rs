//! Daily retention sweep: old synced events and old screenshot files.

use tokio::time::Duration;

use crate::{db::Database, sensing::ScreenshotStore, utils::PeriodicTask};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

pub const SWEEP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);
pub const SYNCED_EVENT_RETENTION_DAYS: i64 = 30;
pub const SCREENSHOT_RETENTION_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub events_purged: usize,
    pub screenshots_removed: usize,
}

#[derive(Clone)]
pub struct RetentionSweep {
    db: Database,
    screenshots: ScreenshotStore,
}

impl RetentionSweep {
    pub fn new(db: Database, screenshots: ScreenshotStore) -> Self {
        Self { db, screenshots }
    }

    /// First run is one full period after start.
    pub fn spawn(self) -> PeriodicTask {
        PeriodicTask::spawn("retention", SWEEP_PERIOD, SWEEP_PERIOD, move || {
            let sweep = self.clone();
            async move {
                sweep.run_once().await;
            }
        })
    }

    /// The two halves are independent; a failure in one is logged and the
    /// other still runs.
    pub async fn run_once(&self) -> SweepReport {
        log_info!("Running maintenance tasks...");

        let events_purged = match self
            .db
            .purge_synced(chrono::Duration::days(SYNCED_EVENT_RETENTION_DAYS))
            .await
        {
            Ok(count) => count,
            Err(err) => {
                log_error!("Failed to purge old events: {err:?}");
                0
            }
        };

        let store = self.screenshots.clone();
        let max_age = Duration::from_secs(SCREENSHOT_RETENTION_DAYS * 24 * 60 * 60);
        let screenshots_removed =
            match tokio::task::spawn_blocking(move || store.sweep_older_than(max_age)).await {
                Ok(Ok(count)) => count,
                Ok(Err(err)) => {
                    log_error!("Failed to clean up screenshots: {err:?}");
                    0
                }
                Err(err) => {
                    log_error!("Screenshot sweep task failed: {err}");
                    0
                }
            };

        log_info!("Deleted {events_purged} old events and {screenshots_removed} old screenshots");
        SweepReport {
            events_purged,
            screenshots_removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{EventKind, NewEvent};
    use crate::platform::testing::solid_frame;
    use chrono::Utc;
    use std::{fs::File, time::SystemTime};

    #[tokio::test]
    async fn sweep_purges_old_synced_rows_and_old_files() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("events.sqlite3")).unwrap();
        let screenshots = ScreenshotStore::new(dir.path().join("Screenshots"));

        let old_synced = db
            .append_event(
                &NewEvent::new(EventKind::WindowChange, "Finder")
                    .at(Utc::now() - chrono::Duration::days(31)),
            )
            .await
            .unwrap();
        let recent_synced = db
            .append_event(
                &NewEvent::new(EventKind::WindowChange, "Finder")
                    .at(Utc::now() - chrono::Duration::days(1)),
            )
            .await
            .unwrap();
        db.append_event(
            &NewEvent::new(EventKind::WindowChange, "Mail")
                .at(Utc::now() - chrono::Duration::days(45)),
        )
        .await
        .unwrap();
        db.mark_synced(&[old_synced, recent_synced]).await.unwrap();

        let stale = screenshots.save(&solid_frame([9, 9, 9, 255]), Utc::now()).unwrap();
        let fresh = screenshots.save(&solid_frame([8, 8, 8, 255]), Utc::now()).unwrap();
        File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(8 * 24 * 60 * 60))
            .unwrap();

        let report = RetentionSweep::new(db.clone(), screenshots).run_once().await;
        assert_eq!(
            report,
            SweepReport {
                events_purged: 1,
                screenshots_removed: 1,
            }
        );

        let stats = db.event_stats().await.unwrap();
        assert_eq!((stats.total, stats.synced, stats.pending), (2, 1, 1));
        assert!(!stale.exists());
        assert!(fresh.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sweep_can_be_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("events.sqlite3")).unwrap();
        let screenshots = ScreenshotStore::new(dir.path().join("Screenshots"));
        let task = RetentionSweep::new(db, screenshots).spawn();

        assert_eq!(task.name(), "retention");
        assert!(task.is_active());
        task.stop().await;
    }
}
