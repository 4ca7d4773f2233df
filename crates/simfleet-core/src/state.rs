//! Device state as persisted by CoreSimulator.
//!
//! CoreSimulator keeps one directory per device under the device set root
//! (`~/Library/Developer/CoreSimulator/Devices/<udid>`). Its `device.plist`
//! carries an integer `state` field, which is the only thing read here.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Device set location relative to the home directory.
pub const DEFAULT_DEVICE_SET: &str = "Library/Developer/CoreSimulator/Devices";

const DEVICE_PLIST: &str = "device.plist";

/// Lifecycle state of a simulator device.
///
/// Discriminants match the `SimDeviceState` constants in CoreSimulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DeviceState {
    DoesNotExist = -1,
    Creating = 0,
    Shutdown = 1,
    Booting = 2,
    Booted = 3,
    ShuttingDown = 4,
}

impl DeviceState {
    /// The raw CoreSimulator value.
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn description(self) -> &'static str {
        match self {
            DeviceState::DoesNotExist => "DOES_NOT_EXIST",
            DeviceState::Creating => "CREATING",
            DeviceState::Shutdown => "SHUTDOWN",
            DeviceState::Booting => "BOOTING",
            DeviceState::Booted => "BOOTED",
            DeviceState::ShuttingDown => "SHUTTING_DOWN",
        }
    }
}

impl TryFrom<i64> for DeviceState {
    type Error = i64;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            -1 => Ok(DeviceState::DoesNotExist),
            0 => Ok(DeviceState::Creating),
            1 => Ok(DeviceState::Shutdown),
            2 => Ok(DeviceState::Booting),
            3 => Ok(DeviceState::Booted),
            4 => Ok(DeviceState::ShuttingDown),
            other => Err(other),
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors reading a device's persisted state.
#[derive(Error, Debug)]
pub enum StateError {
    /// The state file exists but could not be read or decoded.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: plist::Error,
    },

    /// The state file holds a value outside [`DeviceState`].
    #[error("Unknown device state {0}")]
    Unknown(i64),
}

#[derive(Debug, Deserialize)]
struct DevicePlist {
    state: i64,
}

/// A CoreSimulator device set: the directory holding per-device data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSet {
    root: PathBuf,
}

impl DeviceSet {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The user's default device set, `~/Library/Developer/CoreSimulator/Devices`.
    pub fn default_location() -> Self {
        Self::new(dirs::home_dir().unwrap_or_default().join(DEFAULT_DEVICE_SET))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Data directory for `udid`, with symlinks resolved when it exists.
    pub fn path(&self, udid: &str) -> PathBuf {
        let path = self.root.join(udid);
        std::fs::canonicalize(&path).unwrap_or(path)
    }

    /// Reads the current state of `udid`.
    ///
    /// A missing `device.plist` means [`DeviceState::DoesNotExist`].
    ///
    /// # Errors
    ///
    /// - [`StateError::Read`] if the plist cannot be parsed or lacks `state`
    /// - [`StateError::Unknown`] if `state` is not a known value
    pub fn state(&self, udid: &str) -> Result<DeviceState, StateError> {
        let path = self.root.join(udid).join(DEVICE_PLIST);
        if !path.is_file() {
            return Ok(DeviceState::DoesNotExist);
        }
        let descriptor: DevicePlist =
            plist::from_file(&path).map_err(|source| StateError::Read { path, source })?;
        DeviceState::try_from(descriptor.state).map_err(StateError::Unknown)
    }
}

impl Default for DeviceSet {
    fn default() -> Self {
        Self::default_location()
    }
}
