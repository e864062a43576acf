use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "NebulaTracker";
const HOME_ENV: &str = "NEBULA_TRACKER_HOME";

/// On-disk layout under the application-support root.
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// `$NEBULA_TRACKER_HOME` if set, else `<data dir>/NebulaTracker`.
    pub fn resolve(override_root: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = override_root {
            return Ok(Self::new(root));
        }
        if let Some(root) = std::env::var_os(HOME_ENV) {
            return Ok(Self::new(PathBuf::from(root)));
        }
        let base = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
            .context("could not determine an application data directory")?;
        Ok(Self::new(base.join(APP_DIR_NAME)))
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.screenshots_dir()).with_context(|| {
            format!(
                "failed to create screenshot directory {}",
                self.screenshots_dir().display()
            )
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn database_file(&self) -> PathBuf {
        self.root.join("events.sqlite3")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.root.join("Screenshots")
    }

    pub fn permission_state_file(&self) -> PathBuf {
        self.root.join("permission_state.json")
    }
}
