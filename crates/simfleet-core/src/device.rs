//! Device lifecycle control: create, shut down, delete and erase simulator
//! devices, and wait for their state transitions.
//!
//! All operations block the calling thread. Waiting is a poll loop that
//! re-reads the device's on-disk state at a fixed interval until the target
//! state is reached or a deadline passes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use simfleet_core::device::{DeviceController, WaitConfig};
//! use simfleet_core::simctl::XcrunSimctl;
//! use simfleet_core::state::{DeviceSet, DeviceState};
//!
//! let controller = DeviceController::new(
//!     Arc::new(XcrunSimctl::default()),
//!     DeviceSet::default_location(),
//!     WaitConfig::default(),
//! );
//! let udid = "A1B2C3D4-E5F6-7890-ABCD-EF1234567890";
//! controller.wait_until_state(udid, DeviceState::Booted, Duration::from_secs(60)).unwrap();
//! controller.shutdown(udid).unwrap();
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{DeviceType, Runtime};
use crate::simctl::{SimctlError, SimctlRunner};
use crate::state::{DeviceSet, DeviceState, StateError};

/// SpringBoard's services show up in `launchctl print system` once the
/// device has finished booting.
static SPRINGBOARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"A\s+com\.apple\.springboard\.services").expect("springboard pattern")
});

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timeouts and poll intervals used while waiting on devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    /// Budget for each state wait, and separately for the boot-completion check.
    pub state_timeout: Duration,
    /// Delay between state polls.
    pub state_poll_interval: Duration,
    /// Delay between boot-completion checks.
    pub boot_poll_interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            state_timeout: Duration::from_secs(5 * 60),
            state_poll_interval: Duration::from_millis(500),
            boot_poll_interval: Duration::from_secs(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from device lifecycle operations.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device's persisted state could not be read.
    #[error(transparent)]
    State(#[from] StateError),

    /// A simctl invocation failed.
    #[error("simctl error: {0}")]
    Simctl(#[from] SimctlError),

    /// The device did not reach the expected state in time.
    #[error("Timed out waiting for simulator device to enter state {expected}; current state is {actual}")]
    Timeout {
        expected: DeviceState,
        actual: DeviceState,
    },

    /// The device reached BOOTED but never reported SpringBoard running.
    #[error("Timed out waiting for simulator device {udid} to finish booting")]
    BootTimeout { udid: String },

    /// The device left BOOTED while waiting for boot to complete.
    #[error("Simulator device {udid} quit unexpectedly")]
    QuitUnexpectedly { udid: String },

    /// `simctl delete` or `simctl erase` failed.
    #[error("\"xcrun simctl {command}\" failed: device state is {state}")]
    CommandFailed {
        command: &'static str,
        state: String,
        #[source]
        source: SimctlError,
    },

    /// `simctl create` printed something other than a udid.
    #[error("simctl create returned an invalid udid: \"{0}\"")]
    InvalidUdid(String),
}

/// `None` when `timeout` reaches past what [`Instant`] can represent,
/// meaning the wait never expires.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

// ---------------------------------------------------------------------------
// DeviceController
// ---------------------------------------------------------------------------

/// Drives simulator devices through simctl and watches their state on disk.
#[derive(Clone)]
pub struct DeviceController {
    simctl: Arc<dyn SimctlRunner>,
    device_set: DeviceSet,
    wait: WaitConfig,
}

impl DeviceController {
    pub fn new(simctl: Arc<dyn SimctlRunner>, device_set: DeviceSet, wait: WaitConfig) -> Self {
        Self {
            simctl,
            device_set,
            wait,
        }
    }

    pub fn simctl(&self) -> &dyn SimctlRunner {
        self.simctl.as_ref()
    }

    pub fn device_set(&self) -> &DeviceSet {
        &self.device_set
    }

    pub fn wait_config(&self) -> &WaitConfig {
        &self.wait
    }

    /// Current state of `udid`, read fresh from disk.
    pub fn state(&self, udid: &str) -> Result<DeviceState, DeviceError> {
        Ok(self.device_set.state(udid)?)
    }

    /// Data directory of `udid`.
    pub fn path(&self, udid: &str) -> PathBuf {
        self.device_set.path(udid)
    }

    /// Polls until `udid` is in `target`.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::Timeout`] naming both states if `timeout` elapses first
    /// - [`DeviceError::State`] if the state file cannot be read
    pub fn wait_until_state(
        &self,
        udid: &str,
        target: DeviceState,
        timeout: Duration,
    ) -> Result<(), DeviceError> {
        debug!(udid, expected = %target, timeout_secs = timeout.as_secs(), "waiting for device state");
        let deadline = deadline_after(timeout);

        loop {
            let state = self.state(udid)?;
            if state == target {
                return Ok(());
            }
            if expired(deadline) {
                return Err(DeviceError::Timeout {
                    expected: target,
                    actual: state,
                });
            }
            debug!(udid, %state, "device state");
            thread::sleep(self.wait.state_poll_interval);
        }
    }

    /// Waits for BOOTED, then for SpringBoard's services to register.
    ///
    /// The second phase gets its own `timeout` budget. A failed check is
    /// retried as long as the device is still BOOTED.
    ///
    /// # Errors
    ///
    /// - Any error from [`wait_until_state`](Self::wait_until_state)
    /// - [`DeviceError::QuitUnexpectedly`] if the device leaves BOOTED
    /// - [`DeviceError::BootTimeout`] if SpringBoard never shows up
    pub fn wait_until_booted(&self, udid: &str, timeout: Duration) -> Result<(), DeviceError> {
        self.wait_until_state(udid, DeviceState::Booted, timeout)?;

        let deadline = deadline_after(timeout);
        loop {
            let check = self
                .simctl
                .run(&["spawn", udid, "launchctl", "print", "system"])
                .and_then(|output| output.into_stdout("spawn"));
            match check {
                Ok(services) => {
                    debug!(udid, "checked boot status");
                    if SPRINGBOARD_RE.is_match(&services) {
                        info!(udid, "simulator device booted");
                        return Ok(());
                    }
                }
                Err(e) => {
                    if self.state(udid)? != DeviceState::Booted {
                        return Err(DeviceError::QuitUnexpectedly {
                            udid: udid.to_string(),
                        });
                    }
                    warn!(udid, error = %e, "error checking simulator boot status, will retry");
                }
            }

            if expired(deadline) {
                return Err(DeviceError::BootTimeout {
                    udid: udid.to_string(),
                });
            }
            thread::sleep(self.wait.boot_poll_interval);
        }
    }

    /// Creates a device and waits until it is SHUTDOWN. Returns its udid.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::Simctl`] if `simctl create` fails
    /// - [`DeviceError::InvalidUdid`] if its output is not a udid
    /// - Any error from [`wait_until_state`](Self::wait_until_state)
    pub fn create(
        &self,
        name: &str,
        device_type: &DeviceType,
        runtime: &Runtime,
    ) -> Result<String, DeviceError> {
        let stdout = self
            .simctl
            .run(&["create", name, &device_type.identifier, &runtime.identifier])?
            .into_stdout("create")?;
        let udid = stdout.trim();
        Uuid::parse_str(udid).map_err(|_| DeviceError::InvalidUdid(udid.to_string()))?;
        debug!(
            name,
            device_type = %device_type.identifier,
            runtime = %runtime.identifier,
            udid,
            "simctl create returned"
        );

        self.wait_until_state(udid, DeviceState::Shutdown, self.wait.state_timeout)?;
        Ok(udid.to_string())
    }

    /// Shuts `udid` down and waits for SHUTDOWN.
    ///
    /// `simctl shutdown` is only issued while the device is BOOTING or
    /// BOOTED, and its failure is ignored: other processes may be shutting
    /// the same device down concurrently.
    pub fn shutdown(&self, udid: &str) -> Result<(), DeviceError> {
        let state = self.state(udid)?;
        if matches!(state, DeviceState::Booting | DeviceState::Booted) {
            debug!(udid, "xcrun simctl shutdown");
            let result = self
                .simctl
                .run(&["shutdown", udid])
                .and_then(|output| output.into_stdout("shutdown"));
            if let Err(e) = result {
                debug!(udid, error = %e, "ignoring simctl shutdown failure");
            }
        }
        self.wait_until_state(udid, DeviceState::Shutdown, self.wait.state_timeout)
    }

    /// Shuts down and deletes `udid`.
    pub fn delete(&self, udid: &str) -> Result<(), DeviceError> {
        self.shutdown_then("delete", udid)
    }

    /// Shuts down and erases all content and settings of `udid`.
    pub fn reset(&self, udid: &str) -> Result<(), DeviceError> {
        self.shutdown_then("erase", udid)
    }

    fn shutdown_then(&self, command: &'static str, udid: &str) -> Result<(), DeviceError> {
        self.shutdown(udid)?;
        debug!(udid, "xcrun simctl {}", command);
        let result = self
            .simctl
            .run(&[command, udid])
            .and_then(|output| output.into_stdout(command));
        match result {
            Ok(_) => Ok(()),
            Err(source) => Err(DeviceError::CommandFailed {
                command,
                state: self.describe_state(udid),
                source,
            }),
        }
    }

    fn describe_state(&self, udid: &str) -> String {
        match self.state(udid) {
            Ok(state) => state.to_string(),
            Err(e) => format!("unreadable ({})", e),
        }
    }
}

impl fmt::Debug for DeviceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceController")
            .field("device_set", &self.device_set)
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
