//! # simfleet-core
//!
//! Inventory and lifecycle control for iOS Simulator devices on macOS.
//!
//! This crate shells out to `xcrun simctl`, parses its text listing into a
//! typed graph of device types, runtimes and devices, and drives devices
//! through create, boot-wait, shutdown, erase and delete, blocking until each
//! state transition is confirmed on disk.
//!
//! ## Modules
//!
//! - [`simctl`] - Runner abstraction over the `xcrun simctl` CLI
//! - [`parser`] - Parser for the `simctl list` text report
//! - [`model`] - Device type, runtime and device value types
//! - [`state`] - Device states and the on-disk device set
//! - [`device`] - Device lifecycle operations and state waits
//! - [`simulator`] - The inventory with lookups and lookup-or-create
//! - [`registry`] - Slot-indexed pool of managed devices
//! - [`config`] - Persistent configuration in `~/.simfleet/`
//!
//! ## External Dependencies
//!
//! **Xcode** must be installed for `xcrun simctl` to be available.
//!
//! ## Example
//!
//! ```no_run
//! use simfleet_core::config::SimfleetConfig;
//! use simfleet_core::registry::ManagedDevices;
//! use simfleet_core::simulator::Simulator;
//!
//! let mut simulator = Simulator::from_config(&SimfleetConfig::load()).expect("simctl list failed");
//! let device_type = simulator.device_type_by_name("iPhone 8").expect("no iPhone 8");
//! let runtime = simulator.latest_available_runtime().cloned().expect("no runtime");
//!
//! let mut pool = ManagedDevices::new();
//! for slot in 0..2 {
//!     pool.create_device(&mut simulator, slot, &device_type, &runtime).expect("create failed");
//! }
//! for slot in 0..2 {
//!     pool.remove_device(simulator.controller(), slot).expect("delete failed");
//! }
//! ```

pub mod config;
pub mod device;
pub mod model;
pub mod parser;
pub mod registry;
pub mod simctl;
pub mod simulator;
pub mod state;
