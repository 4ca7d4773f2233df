//! The simulator inventory: every device type, runtime and device that
//! `simctl list` reports, plus lookups and lookup-or-create.
//!
//! # Example
//!
//! ```no_run
//! use simfleet_core::config::SimfleetConfig;
//! use simfleet_core::simulator::Simulator;
//!
//! let mut simulator = Simulator::from_config(&SimfleetConfig::load()).unwrap();
//! println!("{}", simulator);
//!
//! let device_type = simulator.device_type_by_name("iPhone 8").unwrap();
//! let runtime = simulator.latest_available_runtime().cloned().unwrap();
//! let device = simulator
//!     .lookup_or_create_device("Scratch iPhone", &device_type, &runtime)
//!     .unwrap();
//! println!("{}", device);
//! ```

use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::SimfleetConfig;
use crate::device::{DeviceController, DeviceError};
use crate::model::{Device, DeviceType, Runtime, Version};
use crate::parser::{parse_listing, ParseError};
use crate::simctl::SimctlError;
use crate::state::DeviceState;

/// Identifier prefix for iOS runtimes.
const IOS_RUNTIME_PREFIX: &str = "com.apple.CoreSimulator.SimRuntime.iOS-";

/// Errors from inventory operations.
#[derive(Error, Debug)]
pub enum SimulatorError {
    /// The `simctl list` report did not follow the expected format.
    #[error("Failed to parse simctl listing: {0}")]
    Parse(#[from] ParseError),

    /// A device lifecycle operation failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Running `simctl list` failed.
    #[error("simctl error: {0}")]
    Simctl(#[from] SimctlError),

    #[error("A device type with name \"{0}\" does not exist.")]
    DeviceTypeNameNotFound(String),

    #[error("A device type with identifier \"{0}\" does not exist.")]
    DeviceTypeIdentifierNotFound(String),

    #[error("A runtime with identifier \"{0}\" does not exist.")]
    RuntimeNotFound(String),

    /// A lookup was called without any of its required filters.
    #[error("Must supply {0}.")]
    MissingFilter(&'static str),

    /// Devices can only be created on available runtimes.
    #[error("Runtime {0} is not available")]
    RuntimeUnavailable(String),

    /// A freshly created device was listed as unavailable.
    #[error("Device \"{name}\" ({udid}) is not available")]
    DeviceUnavailable { name: String, udid: String },

    /// A device simctl just created is missing from the refreshed listing.
    #[error("Device {0} was created but is not in the simctl listing")]
    CreatedDeviceMissing(String),

    /// Managed-device slots must be allocated densely and in order.
    #[error("Managed device slot {slot} requested but the next free slot is {expected}")]
    SlotOutOfOrder { slot: usize, expected: usize },
}

/// The CoreSimulator inventory under the currently selected Xcode.
#[derive(Debug)]
pub struct Simulator {
    runtimes: Vec<Runtime>,
    device_types: Vec<DeviceType>,
    controller: DeviceController,
}

impl Simulator {
    /// Builds the inventory by running `simctl list`.
    pub fn new(controller: DeviceController) -> Result<Self, SimulatorError> {
        let mut simulator = Self {
            runtimes: Vec::new(),
            device_types: Vec::new(),
            controller,
        };
        simulator.refresh()?;
        Ok(simulator)
    }

    /// Builds the inventory using the runner, device set and timings from `config`.
    pub fn from_config(config: &SimfleetConfig) -> Result<Self, SimulatorError> {
        Self::new(config.controller())
    }

    /// Re-reads the inventory from `simctl list`.
    ///
    /// On error the previous inventory is left untouched.
    pub fn refresh(&mut self) -> Result<(), SimulatorError> {
        let listing = self.controller.simctl().run(&["list"])?.into_stdout("list")?;
        let inventory = parse_listing(listing.lines())?;
        self.device_types = inventory.device_types;
        self.runtimes = inventory.runtimes;
        debug!(
            runtimes = self.runtimes.len(),
            device_types = self.device_types.len(),
            "refreshed simulator inventory"
        );
        Ok(())
    }

    pub fn controller(&self) -> &DeviceController {
        &self.controller
    }

    pub fn runtimes(&self) -> &[Runtime] {
        &self.runtimes
    }

    pub fn device_types(&self) -> &[DeviceType] {
        &self.device_types
    }

    /// All devices, runtime by runtime, in listing order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> + '_ {
        self.runtimes.iter().flat_map(|runtime| runtime.devices.iter())
    }

    pub fn available_runtimes(&self) -> impl DoubleEndedIterator<Item = &Runtime> + '_ {
        self.runtimes.iter().filter(|runtime| runtime.available)
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// First device type matching every supplied filter.
    pub fn device_type(&self, name: Option<&str>, identifier: Option<&str>) -> Option<&DeviceType> {
        self.device_types.iter().find(|device_type| {
            name.map_or(true, |name| device_type.name == name)
                && identifier.map_or(true, |identifier| device_type.identifier == identifier)
        })
    }

    pub fn device_type_by_name(&self, name: &str) -> Result<DeviceType, SimulatorError> {
        self.device_type(Some(name), None)
            .cloned()
            .ok_or_else(|| SimulatorError::DeviceTypeNameNotFound(name.to_string()))
    }

    pub fn device_type_by_identifier(&self, identifier: &str) -> Result<DeviceType, SimulatorError> {
        self.device_type(None, Some(identifier))
            .cloned()
            .ok_or_else(|| SimulatorError::DeviceTypeIdentifierNotFound(identifier.to_string()))
    }

    /// First runtime matching every supplied filter.
    ///
    /// # Errors
    ///
    /// [`SimulatorError::MissingFilter`] if neither `version` nor `identifier`
    /// is given.
    pub fn runtime(
        &self,
        version: Option<&Version>,
        identifier: Option<&str>,
        is_internal: Option<bool>,
    ) -> Result<Option<&Runtime>, SimulatorError> {
        if version.is_none() && identifier.is_none() {
            return Err(SimulatorError::MissingFilter("version and/or identifier"));
        }
        Ok(self.runtimes.iter().find(|runtime| {
            version.map_or(true, |version| runtime.version == *version)
                && identifier.map_or(true, |identifier| runtime.identifier == identifier)
                && is_internal.map_or(true, |internal| runtime.is_internal == internal)
        }))
    }

    pub fn runtime_by_identifier(&self, identifier: &str) -> Result<&Runtime, SimulatorError> {
        self.runtime(None, Some(identifier), None)?
            .ok_or_else(|| SimulatorError::RuntimeNotFound(identifier.to_string()))
    }

    /// Looks up an iOS runtime by a version string such as `13.1`.
    pub fn runtime_by_version_string(&self, version: &str) -> Result<&Runtime, SimulatorError> {
        let identifier = format!("{}{}", IOS_RUNTIME_PREFIX, version.replace('.', "-"));
        self.runtime_by_identifier(&identifier)
    }

    pub fn find_device_by_udid(&self, udid: &str) -> Option<&Device> {
        self.devices().find(|device| device.udid == udid)
    }

    /// First device matching every supplied filter.
    ///
    /// With `ignore_unavailable`, devices simctl marked unavailable are
    /// skipped.
    ///
    /// # Errors
    ///
    /// [`SimulatorError::MissingFilter`] if neither `name` nor `runtime` is
    /// given.
    pub fn device(
        &self,
        name: Option<&str>,
        runtime: Option<&Runtime>,
        ignore_unavailable: bool,
    ) -> Result<Option<&Device>, SimulatorError> {
        if name.is_none() && runtime.is_none() {
            return Err(SimulatorError::MissingFilter("name and/or runtime"));
        }
        Ok(self.devices().find(|device| {
            (!ignore_unavailable || device.available)
                && name.map_or(true, |name| device.name == name)
                && runtime.map_or(true, |runtime| device.runtime.refers_to(runtime))
        }))
    }

    /// Some booted device, if any. There is no way to tell which one
    /// Simulator.app itself booted.
    pub fn current_device(&self) -> Result<Option<&Device>, SimulatorError> {
        let device_set = self.controller.device_set();
        for device in self.devices() {
            if device.state(device_set).map_err(DeviceError::from)? == DeviceState::Booted {
                return Ok(Some(device));
            }
        }
        Ok(None)
    }

    /// Highest-versioned available runtime.
    pub fn latest_available_runtime(&self) -> Option<&Runtime> {
        // Reversed so that ties resolve to the first runtime listed.
        self.available_runtimes()
            .rev()
            .max_by(|a, b| a.version.cmp(&b.version))
    }

    // -----------------------------------------------------------------------
    // Device creation and removal
    // -----------------------------------------------------------------------

    /// Creates a device, waits for it to shut down, and returns it as listed
    /// by a fresh `simctl list`.
    pub fn create_device(
        &mut self,
        name: &str,
        device_type: &DeviceType,
        runtime: &Runtime,
    ) -> Result<Device, SimulatorError> {
        let udid = self.controller.create(name, device_type, runtime)?;
        self.refresh()?;
        self.find_device_by_udid(&udid)
            .cloned()
            .ok_or(SimulatorError::CreatedDeviceMissing(udid))
    }

    /// Returns an available device named `name` on `runtime`, creating one if
    /// none exists.
    ///
    /// # Errors
    ///
    /// - [`SimulatorError::RuntimeUnavailable`] if `runtime` is unavailable
    /// - [`SimulatorError::DeviceUnavailable`] if the created device is not available
    /// - Any error from [`create_device`](Self::create_device)
    pub fn lookup_or_create_device(
        &mut self,
        name: &str,
        device_type: &DeviceType,
        runtime: &Runtime,
    ) -> Result<Device, SimulatorError> {
        if !runtime.available {
            return Err(SimulatorError::RuntimeUnavailable(runtime.identifier.clone()));
        }

        if let Some(device) = self.device(Some(name), Some(runtime), true)? {
            debug!(name, device_type = %device_type.name, runtime = %runtime.identifier, udid = %device.udid, "found existing device");
            return Ok(device.clone());
        }

        let device = self.create_device(name, device_type, runtime)?;
        info!(name, device_type = %device_type.name, runtime = %runtime.identifier, udid = %device.udid, "created device");
        if !device.available {
            return Err(SimulatorError::DeviceUnavailable {
                name: device.name,
                udid: device.udid,
            });
        }
        Ok(device)
    }

    pub fn shutdown_device(&self, udid: &str) -> Result<(), SimulatorError> {
        Ok(self.controller.shutdown(udid)?)
    }

    pub fn delete_device(&self, udid: &str) -> Result<(), SimulatorError> {
        Ok(self.controller.delete(udid)?)
    }

    pub fn reset_device(&self, udid: &str) -> Result<(), SimulatorError> {
        Ok(self.controller.reset(udid)?)
    }

    /// Multi-line dump of runtimes, device types and devices, with each
    /// device's current state.
    pub fn describe(&self) -> String {
        let device_set = self.controller.device_set();
        let mut lines = vec!["iOS Simulator:".to_string()];
        lines.extend(self.runtimes.iter().map(ToString::to_string));
        lines.extend(self.device_types.iter().map(ToString::to_string));
        lines.extend(self.devices().map(|device| device.describe(device_set)));
        lines.join("\n")
    }
}

impl fmt::Display for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<iOS Simulator: {} runtimes, {} device types, {} devices>",
            self.runtimes.len(),
            self.device_types.len(),
            self.devices().count()
        )
    }
}
