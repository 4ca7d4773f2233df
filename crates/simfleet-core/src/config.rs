//! Persistent configuration for simfleet.
//!
//! Stores user settings in `~/.simfleet/config.json`. Every field is
//! optional; anything left unset falls back to the CoreSimulator defaults.
//!
//! # Example
//!
//! ```no_run
//! use simfleet_core::config::SimfleetConfig;
//!
//! // Load (returns defaults if file doesn't exist)
//! let config = SimfleetConfig::load();
//! println!("devices live in {}", config.device_set().root().display());
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceController, WaitConfig};
use crate::simctl::XcrunSimctl;
use crate::state::DeviceSet;

const CONFIG_FILENAME: &str = "config.json";

/// Returns the simfleet data directory (`~/.simfleet/`).
pub fn simfleet_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".simfleet")
}

/// Persistent simfleet configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SimfleetConfig {
    /// Program run as `<program> simctl ...`. Defaults to `xcrun`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simctl_program: Option<PathBuf>,

    /// CoreSimulator device set. Defaults to `~/Library/Developer/CoreSimulator/Devices`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_set_path: Option<PathBuf>,

    /// Budget for each state wait, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_poll_interval_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_poll_interval_ms: Option<u64>,
}

impl SimfleetConfig {
    /// Load config from `~/.simfleet/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&simfleet_dir().join(CONFIG_FILENAME))
    }

    /// Load config from `path`, falling back to [`Default`].
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to `~/.simfleet/config.json`.
    pub fn save(&self) -> std::io::Result<()> {
        let dir = simfleet_dir();
        std::fs::create_dir_all(&dir)?;
        self.save_to(&dir.join(CONFIG_FILENAME))
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    pub fn wait_config(&self) -> WaitConfig {
        let defaults = WaitConfig::default();
        WaitConfig {
            state_timeout: self
                .state_timeout_secs
                .map_or(defaults.state_timeout, Duration::from_secs),
            state_poll_interval: self
                .state_poll_interval_ms
                .map_or(defaults.state_poll_interval, Duration::from_millis),
            boot_poll_interval: self
                .boot_poll_interval_ms
                .map_or(defaults.boot_poll_interval, Duration::from_millis),
        }
    }

    pub fn device_set(&self) -> DeviceSet {
        match &self.device_set_path {
            Some(path) => DeviceSet::new(path),
            None => DeviceSet::default_location(),
        }
    }

    pub fn simctl(&self) -> XcrunSimctl {
        match &self.simctl_program {
            Some(program) => XcrunSimctl::new(program),
            None => XcrunSimctl::default(),
        }
    }

    /// A [`DeviceController`] wired from this configuration.
    pub fn controller(&self) -> DeviceController {
        DeviceController::new(Arc::new(self.simctl()), self.device_set(), self.wait_config())
    }
}
