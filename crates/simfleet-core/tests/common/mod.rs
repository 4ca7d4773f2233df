//! Shared test helpers for simfleet-core integration tests.
//!
//! [`FakeSimctl`] stands in for `xcrun simctl`: it keeps a small device
//! inventory in memory, renders it in the `simctl list` text format, and
//! mirrors every device state change into `device.plist` files under a
//! temporary device set, the way CoreSimulator does.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use simfleet_core::device::{DeviceController, WaitConfig};
use simfleet_core::simctl::{SimctlError, SimctlOutput, SimctlRunner};
use simfleet_core::simulator::Simulator;
use simfleet_core::state::{DeviceSet, DeviceState};

pub const IPHONE_8: &str = "com.apple.CoreSimulator.SimDeviceType.iPhone-8";
pub const IPAD_AIR_2: &str = "com.apple.CoreSimulator.SimDeviceType.iPad-Air-2";
pub const IOS_12_0: &str = "com.apple.CoreSimulator.SimRuntime.iOS-12-0";
pub const IOS_13_0: &str = "com.apple.CoreSimulator.SimRuntime.iOS-13-0";
pub const IOS_13_1: &str = "com.apple.CoreSimulator.SimRuntime.iOS-13-1";

const LISTING_HEAD: &str = "\
== Device Types ==
iPhone 8 (com.apple.CoreSimulator.SimDeviceType.iPhone-8)
iPad Air 2 (com.apple.CoreSimulator.SimDeviceType.iPad-Air-2)
== Runtimes ==
iOS 12.0 (12.0 - 16A366) (com.apple.CoreSimulator.SimRuntime.iOS-12-0)
iOS 13.0 (13.0 - 17A577) (com.apple.CoreSimulator.SimRuntime.iOS-13-0) (unavailable, runtime path not found)
iOS 13.1 (13.1 - 17A844) (com.apple.CoreSimulator.SimRuntime.iOS-13-1)
== Devices ==
";

/// (runtime identifier, section header) in listing order.
const SECTIONS: [(&str, &str); 3] = [
    (IOS_12_0, "-- iOS 12.0 --"),
    (IOS_13_0, "-- Unavailable: com.apple.CoreSimulator.SimRuntime.iOS-13-0 --"),
    (IOS_13_1, "-- iOS 13.1 --"),
];

const SPRINGBOARD_RUNNING: &str = "\
services = {
\t       0      -     com.apple.backboardd
\t       A      -     com.apple.springboard.services
}";

#[derive(Debug, Clone)]
pub struct FakeDevice {
    pub name: String,
    pub udid: String,
    pub runtime: String,
    pub state: DeviceState,
    pub available: bool,
}

#[derive(Default)]
struct Inner {
    devices: Vec<FakeDevice>,
    calls: Vec<Vec<String>>,
    failing: Vec<String>,
}

/// In-memory stand-in for `xcrun simctl`.
pub struct FakeSimctl {
    root: PathBuf,
    inner: Mutex<Inner>,
}

impl FakeSimctl {
    pub fn new(root: &Path) -> Arc<Self> {
        Arc::new(Self {
            root: root.to_path_buf(),
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Adds a device as if it had been created earlier.
    pub fn add_device(&self, name: &str, runtime: &str, state: DeviceState, available: bool) -> String {
        let udid = uuid::Uuid::new_v4().to_string().to_uppercase();
        let device = FakeDevice {
            name: name.to_string(),
            udid: udid.clone(),
            runtime: runtime.to_string(),
            state,
            available,
        };
        write_state(&self.root, &udid, state);
        self.inner.lock().unwrap().devices.push(device);
        udid
    }

    pub fn set_state(&self, udid: &str, state: DeviceState) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(device) = inner.devices.iter_mut().find(|d| d.udid == udid) {
            device.state = state;
        }
        write_state(&self.root, udid, state);
    }

    /// Makes every later invocation of `command` exit non-zero.
    pub fn fail(&self, command: &str) {
        self.inner.lock().unwrap().failing.push(command.to_string());
    }

    pub fn devices(&self) -> Vec<FakeDevice> {
        self.inner.lock().unwrap().devices.clone()
    }

    /// Subcommand names in call order, e.g. `["list", "create", "list"]`.
    pub fn commands(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|call| call[0].clone())
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| *c == command).count()
    }

    fn listing(inner: &Inner) -> String {
        let mut out = String::from(LISTING_HEAD);
        for (runtime, header) in SECTIONS {
            out.push_str(header);
            out.push('\n');
            for device in inner.devices.iter().filter(|d| d.runtime == runtime) {
                let state = match device.state {
                    DeviceState::Booted => "Booted",
                    DeviceState::Booting => "Booting",
                    DeviceState::ShuttingDown => "Shutting Down",
                    DeviceState::Creating => "Creating",
                    _ => "Shutdown",
                };
                out.push_str(&format!("    {} ({}) ({})", device.name, device.udid, state));
                if !device.available {
                    out.push_str(" (unavailable, device type profile not found)");
                }
                out.push('\n');
            }
        }
        out.push_str("== Device Pairs ==\n");
        out
    }
}

impl SimctlRunner for FakeSimctl {
    fn run(&self, args: &[&str]) -> Result<SimctlOutput, SimctlError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(args.iter().map(|a| a.to_string()).collect());

        if inner.failing.iter().any(|c| c == args[0]) {
            return Ok(SimctlOutput::failed(format!("simctl {} failed", args[0])));
        }

        match args {
            ["list"] => Ok(SimctlOutput::ok(Self::listing(&inner))),
            ["create", name, _device_type, runtime] => {
                let udid = uuid::Uuid::new_v4().to_string().to_uppercase();
                inner.devices.push(FakeDevice {
                    name: name.to_string(),
                    udid: udid.clone(),
                    runtime: runtime.to_string(),
                    state: DeviceState::Shutdown,
                    available: true,
                });
                write_state(&self.root, &udid, DeviceState::Shutdown);
                Ok(SimctlOutput::ok(format!("{}\n", udid)))
            }
            ["shutdown", udid] => {
                if let Some(device) = inner.devices.iter_mut().find(|d| d.udid == *udid) {
                    device.state = DeviceState::Shutdown;
                }
                write_state(&self.root, udid, DeviceState::Shutdown);
                Ok(SimctlOutput::ok(""))
            }
            ["delete", udid] => {
                inner.devices.retain(|d| d.udid != *udid);
                let _ = std::fs::remove_dir_all(self.root.join(udid));
                Ok(SimctlOutput::ok(""))
            }
            ["erase", _udid] => Ok(SimctlOutput::ok("")),
            ["spawn", _udid, "launchctl", "print", "system"] => {
                Ok(SimctlOutput::ok(SPRINGBOARD_RUNNING))
            }
            other => Ok(SimctlOutput::failed(format!("unknown subcommand {:?}", other))),
        }
    }
}

/// Writes `<root>/<udid>/device.plist` with the given state.
pub fn write_state(root: &Path, udid: &str, state: DeviceState) {
    let dir = root.join(udid);
    std::fs::create_dir_all(&dir).unwrap();
    let plist = format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" ",
            "\"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
            "<plist version=\"1.0\">\n<dict>\n",
            "\t<key>UDID</key>\n\t<string>{}</string>\n",
            "\t<key>state</key>\n\t<integer>{}</integer>\n",
            "</dict>\n</plist>\n"
        ),
        udid,
        state.code()
    );
    std::fs::write(dir.join("device.plist"), plist).unwrap();
}

/// Short waits so failing tests fail fast.
pub fn fast_wait() -> WaitConfig {
    WaitConfig {
        state_timeout: Duration::from_secs(2),
        state_poll_interval: Duration::from_millis(10),
        boot_poll_interval: Duration::from_millis(10),
    }
}

/// A fake simctl, a temporary device set, and a controller wired to both.
pub struct Fixture {
    pub dir: TempDir,
    pub simctl: Arc<FakeSimctl>,
    pub controller: DeviceController,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let simctl = FakeSimctl::new(dir.path());
        let controller = DeviceController::new(
            simctl.clone(),
            DeviceSet::new(dir.path()),
            fast_wait(),
        );
        Self {
            dir,
            simctl,
            controller,
        }
    }

    pub fn simulator(&self) -> Simulator {
        Simulator::new(self.controller.clone()).unwrap()
    }
}

/// Path to a file under `tests/fixtures/`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}
