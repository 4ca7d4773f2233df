//! Inventory value types: device types, runtimes and devices.
//!
//! These mirror what `simctl list` reports. A [`Runtime`] owns the
//! [`Device`]s listed under it; each device keeps a [`RuntimeRef`] back to its
//! runtime rather than a pointer, so the graph stays plain owned data.
//!
//! Live device properties (state, data path) are deliberately absent here.
//! They are read on demand through [`DeviceSet`](crate::state::DeviceSet).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::state::{DeviceSet, DeviceState, StateError};

/// A dotted version string could not be parsed into integers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid version \"{0}\"")]
pub struct InvalidVersion(pub String);

/// An OS version such as `13.1`, compared component-wise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Version(Vec<u32>);

impl Version {
    pub fn new(parts: Vec<u32>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[u32] {
        &self.0
    }
}

impl<const N: usize> From<[u32; N]> for Version {
    fn from(parts: [u32; N]) -> Self {
        Self(parts.to_vec())
    }
}

impl FromStr for Version {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
            .map_err(|_| InvalidVersion(s.to_string()))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = self.0.iter();
        if let Some(first) = parts.next() {
            write!(f, "{}", first)?;
        }
        for part in parts {
            write!(f, ".{}", part)?;
        }
        Ok(())
    }
}

/// A CoreSimulator hardware profile, e.g. `iPhone 8`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceType {
    /// Human-readable name.
    pub name: String,
    /// CoreSimulator identifier, e.g. `com.apple.CoreSimulator.SimDeviceType.iPhone-8`.
    pub identifier: String,
}

impl DeviceType {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<DeviceType \"{}\": {}>", self.name, self.identifier)
    }
}

/// The identity of a [`Runtime`]: the fields runtime equality is defined on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RuntimeRef {
    pub version: Version,
    pub identifier: String,
    pub is_internal: bool,
}

impl RuntimeRef {
    /// Whether this reference names `runtime`.
    pub fn refers_to(&self, runtime: &Runtime) -> bool {
        self.version == runtime.version
            && self.identifier == runtime.identifier
            && self.is_internal == runtime.is_internal
    }
}

/// A CoreSimulator runtime: an OS image devices boot.
///
/// Equality compares version, identifier and the internal flag only; the
/// device list and availability are ignored.
#[derive(Debug, Clone, Serialize)]
pub struct Runtime {
    /// OS version as listed (without the build's revision component).
    pub version: Version,
    /// CoreSimulator identifier, e.g. `com.apple.CoreSimulator.SimRuntime.iOS-13-1`.
    pub identifier: String,
    /// False when simctl marked the runtime unavailable.
    pub available: bool,
    /// Apple-internal runtime variant.
    pub is_internal: bool,
    /// Devices listed under this runtime, in listing order.
    pub devices: Vec<Device>,
}

impl Runtime {
    pub fn new(
        version: Version,
        identifier: impl Into<String>,
        available: bool,
        is_internal: bool,
    ) -> Self {
        Self {
            version,
            identifier: identifier.into(),
            available,
            is_internal,
            devices: Vec::new(),
        }
    }

    /// A back-reference suitable for storing in a [`Device`].
    pub fn reference(&self) -> RuntimeRef {
        RuntimeRef {
            version: self.version.clone(),
            identifier: self.identifier.clone(),
            is_internal: self.is_internal,
        }
    }
}

impl PartialEq for Runtime {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.identifier == other.identifier
            && self.is_internal == other.is_internal
    }
}

impl Eq for Runtime {}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = if self.is_internal { " Internal" } else { "" };
        write!(
            f,
            "<Runtime {}{}: {}. Available: {}, {} devices>",
            self.version,
            suffix,
            self.identifier,
            self.available,
            self.devices.len()
        )
    }
}

/// A simulated device instance under a runtime.
///
/// Equality compares the udid only.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub name: String,
    /// Unique device identifier (a UUID string).
    pub udid: String,
    /// False when simctl marked the device unavailable.
    pub available: bool,
    /// The runtime this device is listed under.
    pub runtime: RuntimeRef,
}

impl Device {
    pub fn new(
        name: impl Into<String>,
        udid: impl Into<String>,
        available: bool,
        runtime: RuntimeRef,
    ) -> Self {
        Self {
            name: name.into(),
            udid: udid.into(),
            available,
            runtime,
        }
    }

    /// Current state, re-read from disk on every call.
    pub fn state(&self, device_set: &DeviceSet) -> Result<DeviceState, StateError> {
        device_set.state(&self.udid)
    }

    /// Directory holding this device's data.
    pub fn path(&self, device_set: &DeviceSet) -> PathBuf {
        device_set.path(&self.udid)
    }

    /// Like [`Display`](fmt::Display), plus the live state read from `device_set`.
    pub fn describe(&self, device_set: &DeviceSet) -> String {
        let state = match self.state(device_set) {
            Ok(state) => state.description().to_string(),
            Err(e) => format!("unreadable ({})", e),
        };
        format!(
            "<Device \"{}\": {}. State: {}. Runtime: {}, Available: {}>",
            self.name, self.udid, state, self.runtime.identifier, self.available
        )
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.udid == other.udid
    }
}

impl Eq for Device {}

/// The state needs a [`DeviceSet`]; see [`Device::describe`].
impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Device \"{}\": {}. Runtime: {}, Available: {}>",
            self.name, self.udid, self.runtime.identifier, self.available
        )
    }
}
