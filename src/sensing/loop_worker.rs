use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ConfigStore,
    db::{Database, EventKind, Metadata, NewEvent},
    platform::{gated_window_title, Platform},
};

use super::change_detector::{content_hash, ChangeDetector};
use super::screenshots::ScreenshotStore;
use super::state::CaptureState;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const CAPTURE_TIMEOUT_SECS: u64 = 10;
const UNKNOWN_APP: &str = "Unknown";

/// Everything the capture task needs, cloned into it at start.
#[derive(Clone)]
pub struct CaptureContext {
    pub db: Database,
    pub platform: Arc<dyn Platform>,
    pub config: Arc<ConfigStore>,
    pub screenshots: ScreenshotStore,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SensingIntervals {
    pub poll: Duration,
    pub capture: Duration,
}

/// Single task that owns [`CaptureState`] and multiplexes the three
/// triggers: focus notifications, the window poll and the capture timer.
pub(crate) async fn sensing_loop(
    ctx: CaptureContext,
    mut focus_rx: mpsc::UnboundedReceiver<String>,
    intervals: SensingIntervals,
    cancel_token: CancellationToken,
) {
    let mut state = CaptureState::default();

    let mut poll_ticker = tokio::time::interval(intervals.poll);
    poll_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut capture_ticker = tokio::time::interval(intervals.capture);
    capture_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            Some(app_name) = focus_rx.recv() => {
                handle_focus_change(&ctx, &mut state, app_name).await;
            }
            _ = poll_ticker.tick() => {
                poll_active_window(&ctx, &mut state).await;
            }
            _ = capture_ticker.tick() => {
                capture_if_changed(&ctx, &mut state.detector).await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("capture loop shutting down");
                break;
            }
        }
    }
}

pub(crate) async fn handle_focus_change(
    ctx: &CaptureContext,
    state: &mut CaptureState,
    app_name: String,
) {
    if !ctx.config.snapshot().enable_window_tracking {
        return;
    }
    if state.last_app.as_deref() == Some(app_name.as_str()) {
        return;
    }

    let app_name = app_label(Some(app_name));
    state.last_app = Some(app_name.clone());
    log_info!("Active app changed to: {app_name}");

    let title = gated_window_title(ctx.platform.as_ref());
    let event = NewEvent::new(EventKind::WindowChange, app_name).with_window_title(title);
    append_or_drop(&ctx.db, &event).await;

    capture_if_changed(ctx, &mut state.detector).await;
}

pub(crate) async fn poll_active_window(ctx: &CaptureContext, state: &mut CaptureState) {
    if !ctx.config.snapshot().enable_window_tracking {
        return;
    }
    let Some(app_name) = ctx.platform.frontmost_app() else {
        return;
    };
    let Some(title) = gated_window_title(ctx.platform.as_ref()) else {
        return;
    };
    if state.last_title.as_deref() == Some(title.as_str()) {
        return;
    }

    state.last_title = Some(title.clone());
    log_debug!("Window title changed to: {title}");

    let event = NewEvent::new(EventKind::WindowChange, app_label(Some(app_name)))
        .with_window_title(Some(title));
    append_or_drop(&ctx.db, &event).await;

    capture_if_changed(ctx, &mut state.detector).await;
}

/// One capture attempt, bounded by a timeout. Failures are logged and
/// swallowed; the next trigger simply tries again.
pub(crate) async fn capture_if_changed(ctx: &CaptureContext, detector: &mut ChangeDetector) {
    let fut = try_capture(ctx, detector);
    match tokio::time::timeout(Duration::from_secs(CAPTURE_TIMEOUT_SECS), fut).await {
        Ok(Ok(Some(event_id))) => log_debug!("screenshot event {event_id} recorded"),
        Ok(Ok(None)) => {}
        Ok(Err(err)) => log_error!("screen capture failed: {err:?}"),
        Err(_) => log_warn!("screen capture timeout (> {}s)", CAPTURE_TIMEOUT_SECS),
    }
}

async fn try_capture(ctx: &CaptureContext, detector: &mut ChangeDetector) -> Result<Option<i64>> {
    if !ctx.config.snapshot().enable_screen_capture || !ctx.platform.can_capture_screen() {
        return Ok(None);
    }

    let platform = Arc::clone(&ctx.platform);
    let (image, hash) = tokio::task::spawn_blocking(move || -> Result<_> {
        let image = platform.capture_screen()?;
        let hash = content_hash(&image);
        Ok((image, hash))
    })
    .await
    .context("screen capture worker join failed")??;

    if !detector.is_new(&hash) {
        log_debug!("screen unchanged, skipping capture");
        return Ok(None);
    }

    let taken_at = Utc::now();
    let (width, height) = (image.width(), image.height());
    let store = ctx.screenshots.clone();
    let path = tokio::task::spawn_blocking(move || store.save(&image, taken_at))
        .await
        .context("screenshot writer join failed")??;
    log_info!("Screenshot saved at {}", path.display());
    detector.commit(hash.clone());

    let mut metadata = Metadata::new();
    metadata.insert("content_hash".into(), json!(hash));
    metadata.insert("width".into(), json!(width));
    metadata.insert("height".into(), json!(height));

    // The file is on disk before the event that references it is visible.
    let event = NewEvent::new(
        EventKind::Screenshot,
        app_label(ctx.platform.frontmost_app()),
    )
    .with_screenshot_path(path.to_string_lossy())
    .with_metadata(metadata)
    .at(taken_at);

    let id = ctx
        .db
        .append_event(&event)
        .await
        .context("failed to persist screenshot event")?;
    Ok(Some(id))
}

async fn append_or_drop(db: &Database, event: &NewEvent) {
    if let Err(err) = db.append_event(event).await {
        log_error!("dropping {} event for {}: {err:?}", event.kind.as_str(), event.app_name);
    }
}

fn app_label(name: Option<String>) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => name,
        _ => UNKNOWN_APP.to_string(),
    }
}
