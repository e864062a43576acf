//! Bookkeeping for permission prompts, so a denied user is not nagged on
//! every launch. Stored next to the config as `permission_state.json`.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

const REPROMPT_AFTER_HOURS: i64 = 24;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionState {
    pub accessibility_requested_at: Option<DateTime<Utc>>,
    pub screen_recording_requested_at: Option<DateTime<Utc>>,
    pub last_prompt_at: Option<DateTime<Utc>>,
}

impl PermissionState {
    pub fn has_requested_accessibility(&self) -> bool {
        self.accessibility_requested_at.is_some()
    }

    pub fn has_requested_screen_recording(&self) -> bool {
        self.screen_recording_requested_at.is_some()
    }

    pub fn record_accessibility_request(&mut self, at: DateTime<Utc>) {
        self.accessibility_requested_at = Some(at);
        self.last_prompt_at = Some(at);
    }

    pub fn record_screen_recording_request(&mut self, at: DateTime<Utc>) {
        self.screen_recording_requested_at = Some(at);
        self.last_prompt_at = Some(at);
    }

    pub fn can_prompt_again(&self, now: DateTime<Utc>) -> bool {
        match self.last_prompt_at {
            Some(last) => now - last > Duration::hours(REPROMPT_AFTER_HOURS),
            None => true,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

pub struct PermissionStateFile {
    path: PathBuf,
}

impl PermissionStateFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// A missing or corrupt file reads as the default state.
    pub fn load(&self) -> PermissionState {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return PermissionState::default();
        };
        serde_json::from_str(&contents).unwrap_or_else(|err| {
            warn!(
                "Ignoring unreadable permission state at {}: {err}",
                self.path.display()
            );
            PermissionState::default()
        })
    }

    pub fn store(&self, state: &PermissionState) -> Result<()> {
        let serialized = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, serialized).with_context(|| {
            format!("Failed to write permission state to {}", self.path.display())
        })
    }
}
