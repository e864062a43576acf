//! Owns every long-lived service for one run of the tracker.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::{
    config::ConfigStore,
    db::{Database, EventStats},
    maintenance::RetentionSweep,
    paths::AppPaths,
    permissions::PermissionStateFile,
    platform::Platform,
    sensing::{CaptureContext, CaptureScheduler, ScreenshotStore},
    sync::{EventTransport, SyncAgent},
    utils::{logging::apply_debug_mode, PeriodicTask},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// What has to hold before the services may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preflight {
    pub configured: bool,
    pub window_focus: bool,
    pub screen_capture: bool,
}

impl Preflight {
    pub fn has_all_permissions(&self) -> bool {
        self.window_focus && self.screen_capture
    }

    pub fn ready(&self) -> bool {
        self.configured && self.has_all_permissions()
    }
}

pub struct Tracker {
    paths: AppPaths,
    db: Database,
    config: Arc<ConfigStore>,
    platform: Arc<dyn Platform>,
    screenshots: ScreenshotStore,
    scheduler: CaptureScheduler,
    sync: SyncAgent,
    maintenance: Option<PeriodicTask>,
}

impl Tracker {
    /// Creates the directory layout, loads (or seeds) the config and opens
    /// the store. Nothing is started yet.
    pub fn open(
        paths: AppPaths,
        platform: Arc<dyn Platform>,
        transport: Arc<dyn EventTransport>,
    ) -> Result<Self> {
        paths.ensure_dirs()?;

        let config = Arc::new(ConfigStore::load_or_create(paths.config_file())?);
        apply_debug_mode(config.snapshot().debug_mode);

        let db = Database::new(paths.database_file()).with_context(|| {
            format!("failed to open event store at {}", paths.database_file().display())
        })?;

        let sync = SyncAgent::new(db.clone(), Arc::clone(&config), transport);
        let screenshots = ScreenshotStore::new(paths.screenshots_dir());

        Ok(Self {
            paths,
            db,
            config,
            platform,
            screenshots,
            scheduler: CaptureScheduler::new(),
            sync,
            maintenance: None,
        })
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn sync_agent(&self) -> &SyncAgent {
        &self.sync
    }

    pub async fn stats(&self) -> Result<EventStats> {
        self.db.event_stats().await
    }

    pub fn preflight(&self) -> Preflight {
        Preflight {
            configured: self.config.is_configured(),
            window_focus: self.platform.can_read_window_focus(),
            screen_capture: self.platform.can_capture_screen(),
        }
    }

    /// Asks the platform for any missing grant, at most once per re-prompt
    /// window. Returns whether a prompt was shown.
    pub fn request_missing_permissions(&self, now: DateTime<Utc>) -> Result<bool> {
        let preflight = self.preflight();
        if preflight.has_all_permissions() {
            return Ok(false);
        }

        let file = PermissionStateFile::new(self.paths.permission_state_file());
        let mut state = file.load();
        if !state.can_prompt_again(now) {
            log_info!("Permission prompt shown recently, not asking again yet");
            return Ok(false);
        }

        if !preflight.window_focus {
            log_info!("Requesting window focus access");
            self.platform.request_window_focus_access();
            state.record_accessibility_request(now);
        }
        if !preflight.screen_capture {
            log_info!("Requesting screen capture access");
            self.platform.request_screen_capture_access();
            state.record_screen_recording_request(now);
        }

        file.store(&state)?;
        Ok(true)
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running() || self.sync.is_scheduled()
    }

    /// Starts capture (when any tracking is enabled), the sync timer and the
    /// daily retention sweep.
    pub fn start(&mut self) -> Result<()> {
        let config = self.config.snapshot();

        if config.enable_window_tracking || config.enable_screen_capture {
            self.scheduler.start(CaptureContext {
                db: self.db.clone(),
                platform: Arc::clone(&self.platform),
                config: Arc::clone(&self.config),
                screenshots: self.screenshots.clone(),
            })?;
            if config.enable_window_tracking {
                log_info!("✓ Window tracking enabled");
            }
            if config.enable_screen_capture {
                log_info!("✓ Screen capture enabled");
            }
        } else {
            log_warn!("Window tracking and screen capture are both disabled");
        }

        self.sync.start();
        log_info!("✓ Sync agent started");

        if self.maintenance.is_none() {
            let sweep = RetentionSweep::new(self.db.clone(), self.screenshots.clone());
            self.maintenance = Some(sweep.spawn());
        }
        Ok(())
    }

    /// Stops the sync timer and waits for a cycle already in flight to
    /// finish, then stops the retention sweep and the capture task.
    pub async fn shutdown(mut self) -> Result<()> {
        self.sync.stop().await;
        if let Some(task) = self.maintenance.take() {
            task.stop().await;
        }
        self.scheduler.stop().await?;
        log_info!("Tracker stopped");
        Ok(())
    }
}
