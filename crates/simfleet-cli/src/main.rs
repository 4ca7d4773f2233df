//! Command-line front end for iOS Simulator inventory and lifecycle control.
//!
//! # Usage
//!
//! ```bash
//! # Show every runtime, device type and device simctl knows about
//! simfleet list
//! simfleet --format json list
//!
//! # Current state of a device, read from its device.plist
//! simfleet state 2E3F4A5B-7C8D-4E9F-8A0B-2C3D4E5F6A03
//!
//! # Create (or reuse with --reuse) a device and print its udid
//! simfleet create "Scratch" "iPhone 8" 13.1
//! simfleet create "Scratch" com.apple.CoreSimulator.SimDeviceType.iPhone-8 \
//!     com.apple.CoreSimulator.SimRuntime.iOS-13-1 --reuse
//!
//! # Lifecycle
//! simfleet wait-booted <udid> --timeout 120
//! simfleet shutdown <udid>
//! simfleet reset <udid>
//! simfleet delete <udid>
//!
//! # Highest available runtime
//! simfleet latest-runtime
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use simfleet_core::config::SimfleetConfig;
use simfleet_core::device::{DeviceController, DeviceError};
use simfleet_core::model::{DeviceType, Runtime};
use simfleet_core::simulator::{Simulator, SimulatorError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Inventory and drive iOS Simulator devices through simctl.
#[derive(Parser)]
#[command(name = "simfleet")]
#[command(about = "Inventory and drive iOS Simulator devices through simctl")]
#[command(version)]
struct Cli {
    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Program run as `<program> simctl ...` (default: xcrun)
    #[arg(long, env = "SIMFLEET_SIMCTL")]
    simctl: Option<PathBuf>,

    /// CoreSimulator device set directory
    #[arg(long, env = "SIMFLEET_DEVICE_SET")]
    device_set: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List runtimes, device types and devices
    List,

    /// Print the current state of a device
    State {
        /// Device udid
        udid: String,
    },

    /// Create a device and print its udid
    Create {
        /// Name for the new device
        name: String,
        /// Device type name or identifier
        device_type: String,
        /// Runtime version (e.g. 13.1) or identifier
        runtime: String,
        /// Reuse an available device with the same name and runtime
        #[arg(long)]
        reuse: bool,
    },

    /// Shut a device down and wait until it is SHUTDOWN
    Shutdown {
        /// Device udid
        udid: String,
    },

    /// Shut down and delete a device
    Delete {
        /// Device udid
        udid: String,
    },

    /// Shut down and erase a device
    Reset {
        /// Device udid
        udid: String,
    },

    /// Wait until a device has finished booting
    WaitBooted {
        /// Device udid
        udid: String,
        /// Timeout in seconds (default: configured state timeout)
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Print the highest-versioned available runtime
    LatestRuntime,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

#[derive(Debug)]
enum CliError {
    /// simctl could not be run or its listing could not be parsed.
    Inventory(String),
    Failed(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Failed(_) => ExitCode::from(1),
            CliError::Inventory(_) => ExitCode::from(2),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Inventory(msg) => write!(f, "Inventory error: {}", msg),
            CliError::Failed(msg) => write!(f, "Operation failed: {}", msg),
        }
    }
}

impl From<SimulatorError> for CliError {
    fn from(e: SimulatorError) -> Self {
        match e {
            SimulatorError::Parse(_) | SimulatorError::Simctl(_) => CliError::Inventory(e.to_string()),
            other => CliError::Failed(other.to_string()),
        }
    }
}

impl From<DeviceError> for CliError {
    fn from(e: DeviceError) -> Self {
        CliError::Failed(e.to_string())
    }
}

fn load_config(cli: &Cli) -> SimfleetConfig {
    let mut config = SimfleetConfig::load();
    if let Some(program) = &cli.simctl {
        config.simctl_program = Some(program.clone());
    }
    if let Some(path) = &cli.device_set {
        config.device_set_path = Some(path.clone());
    }
    debug!(?config, "loaded configuration");
    config
}

fn resolve_device_type(simulator: &Simulator, query: &str) -> Result<DeviceType, CliError> {
    simulator
        .device_type_by_name(query)
        .or_else(|_| simulator.device_type_by_identifier(query))
        .map_err(CliError::from)
}

fn resolve_runtime(simulator: &Simulator, query: &str) -> Result<Runtime, CliError> {
    let runtime = if query.contains("SimRuntime") {
        simulator.runtime_by_identifier(query)?
    } else {
        simulator.runtime_by_version_string(query)?
    };
    Ok(runtime.clone())
}

fn print_value(format: OutputFormat, text: &str, json: serde_json::Value) {
    if format == OutputFormat::Json {
        println!("{}", json);
    } else {
        println!("{}", text);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli);
    let controller = config.controller();

    match cli.command {
        // Commands that only touch one device don't need the inventory.
        Command::State { udid } => run_state(&controller, cli.format, &udid),
        Command::Shutdown { udid } => Ok(controller.shutdown(&udid)?),
        Command::Delete { udid } => Ok(controller.delete(&udid)?),
        Command::Reset { udid } => Ok(controller.reset(&udid)?),
        Command::WaitBooted { udid, timeout } => {
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or(controller.wait_config().state_timeout);
            Ok(controller.wait_until_booted(&udid, timeout)?)
        }
        Command::List => run_list(&Simulator::new(controller)?, cli.format),
        Command::Create {
            name,
            device_type,
            runtime,
            reuse,
        } => run_create(
            Simulator::new(controller)?,
            cli.format,
            &name,
            &device_type,
            &runtime,
            reuse,
        ),
        Command::LatestRuntime => run_latest_runtime(&Simulator::new(controller)?, cli.format),
    }
}

fn run_state(controller: &DeviceController, format: OutputFormat, udid: &str) -> Result<(), CliError> {
    let state = controller.state(udid)?;
    print_value(
        format,
        state.description(),
        serde_json::json!({ "udid": udid, "state": state.description() }),
    );
    Ok(())
}

fn run_list(simulator: &Simulator, format: OutputFormat) -> Result<(), CliError> {
    if format == OutputFormat::Json {
        let json = serde_json::json!({
            "device_types": simulator.device_types(),
            "runtimes": simulator.runtimes(),
        });
        println!("{}", json);
    } else {
        println!("{}", simulator.describe());
    }
    Ok(())
}

fn run_create(
    mut simulator: Simulator,
    format: OutputFormat,
    name: &str,
    device_type: &str,
    runtime: &str,
    reuse: bool,
) -> Result<(), CliError> {
    let device_type = resolve_device_type(&simulator, device_type)?;
    let runtime = resolve_runtime(&simulator, runtime)?;
    let device = if reuse {
        simulator.lookup_or_create_device(name, &device_type, &runtime)?
    } else {
        simulator.create_device(name, &device_type, &runtime)?
    };
    let json = serde_json::to_value(&device).map_err(|e| CliError::Failed(e.to_string()))?;
    print_value(format, &device.udid, json);
    Ok(())
}

fn run_latest_runtime(simulator: &Simulator, format: OutputFormat) -> Result<(), CliError> {
    let runtime = simulator
        .latest_available_runtime()
        .ok_or_else(|| CliError::Failed("no available runtime".to_string()))?;
    print_value(
        format,
        &runtime.identifier,
        serde_json::json!({
            "identifier": runtime.identifier,
            "version": runtime.version.to_string(),
        }),
    );
    Ok(())
}
