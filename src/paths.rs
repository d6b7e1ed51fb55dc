//! Application path management for portable and installed modes.
//!
//! ## Mode Detection
//!
//! - **Dev mode**: the config file exists in the current working directory;
//!   config and logs stay there.
//! - **Portable mode**: a `.portable` marker file exists next to the
//!   executable; config and logs live next to it.
//! - **Installed mode** (default): data lives in `%APPDATA%\RSTone2MIDI`
//!   (or the platform equivalent).

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::CONFIG_FILE_NAME;

/// Application name used for directories in installed mode
const APP_NAME: &str = "RSTone2MIDI";

/// Application paths for config and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    /// Whether running in portable mode (config next to exe)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Called before logging is initialized, so nothing here logs.
    pub fn detect() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        Self::resolve(&cwd, &exe_dir, dirs::data_dir())
    }

    /// Paths for an explicit `--config` file; logs go next to it
    pub fn with_config(config: impl Into<PathBuf>) -> Self {
        let config = config.into();
        let base = config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            config,
            logs_dir: base.join("logs"),
            is_portable: true,
        }
    }

    fn resolve(cwd: &Path, exe_dir: &Path, data_dir: Option<PathBuf>) -> Self {
        let cwd_config = cwd.join(CONFIG_FILE_NAME);
        if cwd_config.exists() {
            return Self {
                config: cwd_config,
                logs_dir: cwd.join("logs"),
                is_portable: true,
            };
        }

        if exe_dir.join(".portable").exists() {
            return Self {
                config: exe_dir.join(CONFIG_FILE_NAME),
                logs_dir: exe_dir.join("logs"),
                is_portable: true,
            };
        }

        // Without a data dir fall back to the executable's directory
        let app_data = data_dir.unwrap_or_else(|| exe_dir.to_path_buf()).join(APP_NAME);
        Self {
            config: app_data.join(CONFIG_FILE_NAME),
            logs_dir: app_data.join("logs"),
            is_portable: false,
        }
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure the log and config directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        if !self.logs_dir.exists() {
            std::fs::create_dir_all(&self.logs_dir)?;
        }

        let base = self.base_dir();
        if !base.exists() {
            std::fs::create_dir_all(&base)?;
        }

        debug!("Using data directory {}", base.display());
        Ok(())
    }
}
