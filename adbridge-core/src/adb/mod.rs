//! Command Gateway — every device interaction is a short-lived
//! invocation of the external `adb` binary with a hard time budget.
//!
//! The [`CommandRunner`] trait is the seam between protocol logic and
//! process execution; tests substitute scripted runners for a live
//! device.

mod device;
mod gateway;
mod input;

pub use device::{Device, DeviceState, Orientation, parse_device_list};
pub use gateway::{AdbGateway, AdbProcessRunner, detect_adb_path};
pub use input::{escape_shell_text, resolve_keycode};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Default time budget for shell-class commands.
pub const SHELL_TIMEOUT: Duration = Duration::from_secs(30);
/// Default time budget for screen capture.
pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw output of a finished device command.
#[derive(Debug, Clone)]
pub struct RawOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl RawOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Text view of a finished device command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

impl From<RawOutput> for CommandOutput {
    fn from(raw: RawOutput) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&raw.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&raw.stderr).into_owned(),
            exit_code: raw.exit_code,
        }
    }
}

/// Executes device commands. Implemented by the real subprocess runner
/// and by scripted fakes in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a device command and capture stdout as raw bytes.
    ///
    /// `device` selects the target serial (`-s <id>`); `None` addresses
    /// the host-side tool itself (e.g. `devices -l`).
    async fn run_raw(
        &self,
        device: Option<&str>,
        args: &[&str],
        timeout: Duration,
    ) -> Result<RawOutput>;

    /// Run a device command and decode stdout/stderr as text.
    async fn run(
        &self,
        device: Option<&str>,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        Ok(self.run_raw(device, args, timeout).await?.into())
    }
}
