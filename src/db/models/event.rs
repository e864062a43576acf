//! Activity event data model.
//!
//! An event is created once by the capture pipeline, flipped to `synced`
//! at most once by the sync agent, and removed only by the retention sweep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WindowChange,
    Screenshot,
    AppSwitch,
    SystemEvent,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::WindowChange => "window_change",
            EventKind::Screenshot => "screenshot",
            EventKind::AppSwitch => "app_switch",
            EventKind::SystemEvent => "system_event",
        }
    }

    /// Unknown stored values degrade to `SystemEvent` rather than failing the read.
    pub fn from_stored(value: &str) -> Self {
        match value {
            "window_change" => EventKind::WindowChange,
            "screenshot" => EventKind::Screenshot,
            "app_switch" => EventKind::AppSwitch,
            _ => EventKind::SystemEvent,
        }
    }
}

/// An event that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub kind: EventKind,
    pub app_name: String,
    pub window_title: Option<String>,
    pub screenshot_path: Option<String>,
    pub metadata: Option<Metadata>,
    pub timestamp: DateTime<Utc>,
}

impl NewEvent {
    pub fn new(kind: EventKind, app_name: impl Into<String>) -> Self {
        Self {
            kind,
            app_name: app_name.into(),
            window_title: None,
            screenshot_path: None,
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_window_title(mut self, title: Option<String>) -> Self {
        self.window_title = title;
        self
    }

    pub fn with_screenshot_path(mut self, path: impl Into<String>) -> Self {
        self.screenshot_path = Some(path.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub kind: EventKind,
    pub app_name: String,
    pub window_title: Option<String>,
    pub screenshot_path: Option<String>,
    pub metadata: Option<Metadata>,
    pub timestamp: DateTime<Utc>,
    pub synced: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    pub total: u64,
    pub synced: u64,
    pub pending: u64,
}
