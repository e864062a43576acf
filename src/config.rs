use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
    time::Duration,
};

pub const DEFAULT_API_ENDPOINT: &str = "https://api.nebula.app/v1/memory-events";
pub const PLACEHOLDER_API_TOKEN: &str = "YOUR_API_TOKEN_HERE";

const MIN_INTERVAL_SECS: f64 = 1.0;

/// Contents of `config.json`. Every field is optional on disk; missing or
/// `null` fields take their defaults at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ConfigFile")]
pub struct TrackerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Seconds between sync cycles.
    pub sync_interval: f64,
    /// Seconds between periodic screen change checks.
    pub capture_interval: f64,
    pub enable_screen_capture: bool,
    pub enable_window_tracking: bool,
    /// Longest edge, in pixels, of screenshots re-encoded for upload.
    pub max_screenshot_size: u32,
    pub debug_mode: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_endpoint: None,
            api_token: None,
            sync_interval: 60.0,
            capture_interval: 30.0,
            enable_screen_capture: true,
            enable_window_tracking: true,
            max_screenshot_size: 1920,
            debug_mode: false,
        }
    }
}

/// On-disk shape, where any field may be absent or explicitly `null`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigFile {
    api_endpoint: Option<String>,
    api_token: Option<String>,
    sync_interval: Option<f64>,
    capture_interval: Option<f64>,
    enable_screen_capture: Option<bool>,
    enable_window_tracking: Option<bool>,
    max_screenshot_size: Option<u32>,
    debug_mode: Option<bool>,
}

impl From<ConfigFile> for TrackerConfig {
    fn from(file: ConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            api_endpoint: file.api_endpoint,
            api_token: file.api_token,
            sync_interval: file.sync_interval.unwrap_or(defaults.sync_interval),
            capture_interval: file.capture_interval.unwrap_or(defaults.capture_interval),
            enable_screen_capture: file
                .enable_screen_capture
                .unwrap_or(defaults.enable_screen_capture),
            enable_window_tracking: file
                .enable_window_tracking
                .unwrap_or(defaults.enable_window_tracking),
            max_screenshot_size: file
                .max_screenshot_size
                .unwrap_or(defaults.max_screenshot_size),
            debug_mode: file.debug_mode.unwrap_or(defaults.debug_mode),
        }
    }
}

/// Where and how to deliver events. Only exists for a complete config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub endpoint: String,
    pub token: String,
}

impl TrackerConfig {
    /// What gets written on first run: the public endpoint plus a token
    /// placeholder the user has to replace.
    pub fn starter() -> Self {
        Self {
            api_endpoint: Some(DEFAULT_API_ENDPOINT.to_string()),
            api_token: Some(PLACEHOLDER_API_TOKEN.to_string()),
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        self.sync_target().is_some()
    }

    pub fn sync_target(&self) -> Option<SyncTarget> {
        let endpoint = self.api_endpoint.as_deref().map(str::trim)?;
        let token = self.api_token.as_deref().map(str::trim)?;
        if endpoint.is_empty() || token.is_empty() || token == PLACEHOLDER_API_TOKEN {
            return None;
        }
        Some(SyncTarget {
            endpoint: endpoint.to_string(),
            token: token.to_string(),
        })
    }

    pub fn sync_period(&self) -> Duration {
        seconds_to_duration(self.sync_interval)
    }

    pub fn capture_period(&self) -> Duration {
        seconds_to_duration(self.capture_interval)
    }
}

fn seconds_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs >= MIN_INTERVAL_SECS {
        Duration::from_secs_f64(secs)
    } else {
        Duration::from_secs_f64(MIN_INTERVAL_SECS)
    }
}

/// File-backed configuration shared by the capture and sync services.
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<TrackerConfig>,
}

impl ConfigStore {
    /// Loads `path`, writing the starter config first if it does not exist.
    pub fn load_or_create(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            read_config(&path)?
        } else {
            let starter = TrackerConfig::starter();
            write_config(&path, &starter)?;
            info!("Created default config at {}", path.display());
            info!("Edit the config file to add your API token");
            starter
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> TrackerConfig {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_configured(&self) -> bool {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_configured()
    }

    pub fn sync_target(&self) -> Option<SyncTarget> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sync_target()
    }

    /// Applies `change` and persists the result.
    pub fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut TrackerConfig),
    {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        change(&mut guard);
        write_config(&self.path, &guard)?;
        info!("Configuration saved to {}", self.path.display());
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
        write_config(&self.path, &guard)
    }

    pub fn reload(&self) -> Result<()> {
        let data = read_config(&self.path)?;
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = data;
        info!("Configuration reloaded from {}", self.path.display());
        Ok(())
    }
}

fn read_config(path: &Path) -> Result<TrackerConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    match serde_json::from_str(&contents) {
        Ok(config) => Ok(config),
        Err(err) => {
            warn!(
                "Config at {} is not valid JSON ({err}); using defaults",
                path.display()
            );
            Ok(TrackerConfig::default())
        }
    }
}

fn write_config(path: &Path, config: &TrackerConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }

    let serialized = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, serialized)
        .with_context(|| format!("Failed to write config to {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to move config into place at {}", path.display()))
}
