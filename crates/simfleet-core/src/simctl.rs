//! Interface to Apple's `xcrun simctl` command-line tool.
//!
//! Every interaction with CoreSimulator goes through a [`SimctlRunner`], which
//! runs one `simctl` subcommand synchronously and hands back the captured
//! output. [`XcrunSimctl`] is the real implementation; tests substitute a
//! scripted runner so that no simulator is needed.
//!
//! # Requirements
//!
//! Xcode must be installed for `xcrun simctl` to be available.
//!
//! # Example
//!
//! ```no_run
//! use simfleet_core::simctl::{SimctlRunner, XcrunSimctl};
//!
//! let simctl = XcrunSimctl::default();
//! let listing = simctl.run(&["list"]).unwrap().into_stdout("list").unwrap();
//! for line in listing.lines() {
//!     println!("{}", line);
//! }
//! ```

use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;
use tracing::trace;

/// Program used to reach simctl when nothing else is configured.
pub const DEFAULT_SIMCTL_PROGRAM: &str = "xcrun";

/// Errors that can occur when invoking simctl.
#[derive(Error, Debug)]
pub enum SimctlError {
    /// A simctl command exited with a non-zero status.
    #[error("Command execution failed: simctl {command}: {stderr}")]
    CommandFailed {
        /// The simctl subcommand that failed (e.g. `create`).
        command: String,
        /// Captured standard error of the failed process.
        stderr: String,
    },

    /// An I/O error occurred while spawning or waiting on the process.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured result of one simctl invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimctlOutput {
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Everything the process wrote to standard output.
    pub stdout: String,
    /// Everything the process wrote to standard error.
    pub stderr: String,
}

impl SimctlOutput {
    /// Successful output carrying `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output carrying `stderr`.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns standard output, or [`SimctlError::CommandFailed`] if the
    /// process exited unsuccessfully.
    pub fn into_stdout(self, command: &str) -> Result<String, SimctlError> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(SimctlError::CommandFailed {
                command: command.to_string(),
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs `simctl` subcommands.
///
/// Implementations block until the process exits and capture its full output
/// before returning.
pub trait SimctlRunner: Send + Sync {
    /// Runs `simctl <args...>`.
    ///
    /// A non-zero exit is reported through [`SimctlOutput::success`], not as
    /// an `Err`; `Err` is reserved for failing to run the process at all.
    fn run(&self, args: &[&str]) -> Result<SimctlOutput, SimctlError>;
}

/// Runs simctl as `<program> simctl <args...>` via [`std::process::Command`].
#[derive(Debug, Clone)]
pub struct XcrunSimctl {
    program: PathBuf,
}

impl XcrunSimctl {
    /// Uses `program` in place of `xcrun`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The program invoked for each simctl call.
    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl Default for XcrunSimctl {
    fn default() -> Self {
        Self::new(DEFAULT_SIMCTL_PROGRAM)
    }
}

impl SimctlRunner for XcrunSimctl {
    fn run(&self, args: &[&str]) -> Result<SimctlOutput, SimctlError> {
        trace!(program = %self.program.display(), ?args, "running simctl");
        let output = Command::new(&self.program)
            .arg("simctl")
            .args(args)
            .output()?;

        Ok(SimctlOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
