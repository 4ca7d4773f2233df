//! Slot-indexed pool of devices created for a test run.
//!
//! A caller driving several simulators at once hands out small sequential
//! slot numbers (0, 1, 2, ...) and registers one device per slot. Slots must
//! be allocated densely and in order; the registry refuses anything else.
//! The registry is an ordinary value: whoever coordinates the pool owns it
//! and passes it where it is needed.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::debug;

use crate::device::DeviceController;
use crate::model::{Device, DeviceType, Runtime};
use crate::simulator::{Simulator, SimulatorError};

/// Appended to the device type name, followed by the slot number.
pub const MANAGED_DEVICE_SUFFIX: &str = " WebKit Tester";

/// Devices owned by the caller, keyed by slot.
#[derive(Debug, Default)]
pub struct ManagedDevices {
    slots: BTreeMap<usize, Device>,
}

impl ManagedDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name given to the managed device in `slot`, e.g. `iPhone 8 WebKit Tester0`.
    pub fn device_name(device_type: &DeviceType, slot: usize) -> String {
        format!("{}{}{}", device_type.name, MANAGED_DEVICE_SUFFIX, slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The device registered in `slot`, if any.
    pub fn device(&self, slot: usize) -> Option<&Device> {
        self.slots.get(&slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Device)> + '_ {
        self.slots.iter().map(|(slot, device)| (*slot, device))
    }

    /// Looks up or creates the device for `slot` and registers it.
    ///
    /// # Errors
    ///
    /// - [`SimulatorError::SlotOutOfOrder`] unless `slot` equals the number of
    ///   registered devices; nothing is created in that case
    /// - Any error from [`Simulator::lookup_or_create_device`]
    pub fn create_device(
        &mut self,
        simulator: &mut Simulator,
        slot: usize,
        device_type: &DeviceType,
        runtime: &Runtime,
    ) -> Result<&Device, SimulatorError> {
        let expected = self.slots.len();
        if slot != expected {
            return Err(SimulatorError::SlotOutOfOrder { slot, expected });
        }

        let name = Self::device_name(device_type, slot);
        let device = simulator.lookup_or_create_device(&name, device_type, runtime)?;
        debug!(slot, udid = %device.udid, name = %device.name, "registered managed device");

        let device = match self.slots.entry(slot) {
            Entry::Occupied(mut entry) => {
                entry.insert(device);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(device),
        };
        Ok(device)
    }

    /// Unregisters `slot` and deletes its device. Empty slots are ignored.
    pub fn remove_device(
        &mut self,
        controller: &DeviceController,
        slot: usize,
    ) -> Result<(), SimulatorError> {
        let Some(device) = self.slots.remove(&slot) else {
            return Ok(());
        };
        debug!(slot, udid = %device.udid, "removing managed device");
        controller.delete(&device.udid)?;
        Ok(())
    }
}
