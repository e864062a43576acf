use anyhow::{bail, Context, Result};
use log::info;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{sensing_loop, CaptureContext, SensingIntervals};
use crate::platform::{Platform, SubscriptionId};

pub const POLL_INTERVAL_SECS: u64 = 2;

/// Starts and stops the capture task.
pub struct CaptureScheduler {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    focus_subscription: Option<(Arc<dyn Platform>, SubscriptionId)>,
}

impl CaptureScheduler {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            focus_subscription: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, ctx: CaptureContext) -> Result<()> {
        self.start_with_poll_interval(ctx, Duration::from_secs(POLL_INTERVAL_SECS))
    }

    pub(crate) fn start_with_poll_interval(
        &mut self,
        ctx: CaptureContext,
        poll: Duration,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("capture scheduler already running");
        }

        // Focus callbacks may arrive on any thread; funnel them into the
        // capture task so CaptureState has a single owner.
        let (focus_tx, focus_rx) = mpsc::unbounded_channel::<String>();
        let subscription = ctx.platform.subscribe_focus_changes(Box::new(move |app_name| {
            let _ = focus_tx.send(app_name);
        }));
        self.focus_subscription = Some((Arc::clone(&ctx.platform), subscription));

        let intervals = SensingIntervals {
            poll,
            capture: ctx.config.snapshot().capture_period(),
        };
        info!(
            "Starting capture scheduler (poll every {:?}, capture check every {:?})",
            intervals.poll, intervals.capture
        );

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sensing_loop(ctx, focus_rx, intervals, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some((platform, subscription)) = self.focus_subscription.take() {
            platform.unsubscribe_focus_changes(subscription);
        }
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("capture loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for CaptureScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ConfigStore,
        db::{Database, EventKind},
        platform::testing::FakePlatform,
        sensing::ScreenshotStore,
    };
    async fn wait_for_events(db: &Database, at_least: u64) -> u64 {
        for _ in 0..200 {
            let total = db.event_stats().await.unwrap().total;
            if total >= at_least {
                return total;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        db.event_stats().await.unwrap().total
    }

    #[tokio::test]
    async fn focus_notifications_reach_the_capture_task() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("events.sqlite3")).unwrap();
        let config = Arc::new(ConfigStore::load_or_create(dir.path().join("config.json")).unwrap());
        let platform = Arc::new(FakePlatform::new());
        let ctx = CaptureContext {
            db: db.clone(),
            platform: platform.clone(),
            config,
            screenshots: ScreenshotStore::new(dir.path().join("Screenshots")),
        };

        let mut scheduler = CaptureScheduler::new();
        scheduler
            .start_with_poll_interval(ctx.clone(), Duration::from_secs(3600))
            .unwrap();
        assert!(scheduler.is_running());
        assert!(scheduler.start(ctx).is_err());
        assert_eq!(platform.subscriber_count(), 1);

        // The initial capture tick records the first frame.
        assert!(wait_for_events(&db, 1).await >= 1);

        platform.emit_focus_change("Terminal");
        wait_for_events(&db, 2).await;

        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running());

        let pending = db.query_pending(100).await.unwrap();
        assert!(pending
            .iter()
            .any(|e| e.kind == EventKind::WindowChange && e.app_name == "Terminal"));
        assert_eq!(
            pending.iter().filter(|e| e.kind == EventKind::Screenshot).count(),
            1,
            "same frame must not be stored twice"
        );
    }

    #[tokio::test]
    async fn restarting_does_not_pile_up_focus_handlers() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("events.sqlite3")).unwrap();
        let config = Arc::new(ConfigStore::load_or_create(dir.path().join("config.json")).unwrap());
        let platform = Arc::new(FakePlatform::new());
        let ctx = CaptureContext {
            db,
            platform: platform.clone(),
            config,
            screenshots: ScreenshotStore::new(dir.path().join("Screenshots")),
        };

        let mut scheduler = CaptureScheduler::new();
        for _ in 0..3 {
            scheduler
                .start_with_poll_interval(ctx.clone(), Duration::from_secs(3600))
                .unwrap();
            assert_eq!(platform.subscriber_count(), 1);

            scheduler.stop().await.unwrap();
            assert_eq!(platform.subscriber_count(), 0);
        }

        // Nothing is listening, so a late notification goes nowhere.
        platform.emit_focus_change("Terminal");
    }
}
