//! Subprocess execution of the `adb` binary plus the device-level
//! query surface built on top of it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::adb::{
    CAPTURE_TIMEOUT, CommandOutput, CommandRunner, Device, Orientation, RawOutput, SHELL_TIMEOUT,
    parse_device_list,
};
use crate::error::{BridgeError, Result};

#[cfg(windows)]
const ADB_BINARY: &str = "adb.exe";
#[cfg(not(windows))]
const ADB_BINARY: &str = "adb";

/// Locate the adb binary: `$PATH` first, then conventional SDK spots.
pub fn detect_adb_path() -> Result<PathBuf> {
    if let Ok(path) = which::which(ADB_BINARY) {
        return Ok(path);
    }
    for candidate in conventional_paths() {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(BridgeError::ProtocolUnavailable(
        "adb not found in PATH or conventional SDK locations".into(),
    ))
}

fn conventional_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        paths.push(home.join("Android/Sdk/platform-tools").join(ADB_BINARY));
        paths.push(
            home.join("Library/Android/sdk/platform-tools")
                .join(ADB_BINARY),
        );
    }
    if let Some(local) = std::env::var_os("LOCALAPPDATA") {
        paths.push(
            PathBuf::from(local)
                .join("Android/Sdk/platform-tools")
                .join(ADB_BINARY),
        );
    }
    paths.push(PathBuf::from("/usr/local/bin").join(ADB_BINARY));
    paths.push(PathBuf::from("/usr/bin").join(ADB_BINARY));
    paths
}

// ── Process runner ────────────────────────────────────────────────

/// The real runner: one short-lived adb process per call, killed on
/// timeout or drop. No persistent connection is held to any device.
pub struct AdbProcessRunner {
    adb_path: PathBuf,
}

impl AdbProcessRunner {
    pub fn new(adb_path: PathBuf) -> Self {
        Self { adb_path }
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb_path
    }
}

#[async_trait]
impl CommandRunner for AdbProcessRunner {
    async fn run_raw(
        &self,
        device: Option<&str>,
        args: &[&str],
        timeout: Duration,
    ) -> Result<RawOutput> {
        let mut cmd = tokio::process::Command::new(&self.adb_path);
        if let Some(id) = device {
            cmd.arg("-s").arg(id);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(?device, ?args, "adb exec");

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| BridgeError::CommandTimeout(timeout))?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BridgeError::ProtocolUnavailable(self.adb_path.display().to_string())
                } else {
                    BridgeError::Io(e)
                }
            })?;

        Ok(RawOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

// ── Gateway ───────────────────────────────────────────────────────

/// Device-level command surface. All calls are stateless and carry a
/// hard time budget; results are never cached.
#[derive(Clone)]
pub struct AdbGateway {
    runner: Arc<dyn CommandRunner>,
    shell_timeout: Duration,
    capture_timeout: Duration,
}

impl AdbGateway {
    /// Auto-detect the adb binary and build a gateway around it.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(detect_adb_path()?))
    }

    pub fn with_path(adb_path: PathBuf) -> Self {
        Self::with_runner(Arc::new(AdbProcessRunner::new(adb_path)))
    }

    /// Build a gateway over an arbitrary runner (used by tests).
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            shell_timeout: SHELL_TIMEOUT,
            capture_timeout: CAPTURE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, shell: Duration, capture: Duration) -> Self {
        self.shell_timeout = shell;
        self.capture_timeout = capture;
        self
    }

    /// Run a host-side or device command with the shell time budget.
    pub async fn run(&self, device: Option<&str>, args: &[&str]) -> Result<CommandOutput> {
        self.runner.run(device, args, self.shell_timeout).await
    }

    /// Run a shell command on a device.
    pub async fn shell(&self, device: &str, command: &str) -> Result<CommandOutput> {
        self.run(Some(device), &["shell", command]).await
    }

    /// Run a shell command and require a zero exit status.
    pub(crate) async fn shell_ok(&self, device: &str, command: &str) -> Result<()> {
        let out = self.shell(device, command).await?;
        if out.success() {
            Ok(())
        } else {
            Err(BridgeError::CommandFailed {
                code: out.exit_code,
                stderr: non_empty(&out.stderr, &out.stdout),
            })
        }
    }

    // ── Queries ──────────────────────────────────────────────────

    /// List attached devices.
    pub async fn devices(&self) -> Result<Vec<Device>> {
        let out = self.run(None, &["devices", "-l"]).await?;
        if !out.success() {
            return Err(BridgeError::CommandFailed {
                code: out.exit_code,
                stderr: non_empty(&out.stderr, &out.stdout),
            });
        }
        Ok(parse_device_list(&out.stdout))
    }

    /// Capture the screen as PNG bytes. Stdout is kept raw — the image
    /// payload must never pass through a text decode.
    pub async fn screencap(&self, device: &str) -> Result<Vec<u8>> {
        let raw = self
            .runner
            .run_raw(
                Some(device),
                &["shell", "screencap", "-p"],
                self.capture_timeout,
            )
            .await?;
        if !raw.success() {
            return Err(BridgeError::CommandFailed {
                code: raw.exit_code,
                stderr: String::from_utf8_lossy(&raw.stderr).into_owned(),
            });
        }
        Ok(raw.stdout)
    }

    /// Physical screen size in pixels, from `wm size`.
    pub async fn screen_size(&self, device: &str) -> Result<(u32, u32)> {
        let out = self.shell(device, "wm size").await?;
        parse_screen_size(&out.stdout)
            .ok_or_else(|| BridgeError::Other(format!("could not parse screen size for {device}")))
    }

    /// Current orientation, probing two diagnostic sources in order.
    /// Returns `None` when neither source yields a rotation code.
    pub async fn orientation(&self, device: &str) -> Result<Option<Orientation>> {
        const SOURCES: [&str; 2] = [
            "dumpsys input | grep 'SurfaceOrientation' | head -1",
            "dumpsys display | grep 'mCurrentOrientation' | head -1",
        ];
        for source in SOURCES {
            let Ok(out) = self.shell(device, source).await else {
                continue;
            };
            if !out.success() {
                continue;
            }
            if let Some(orientation) = parse_orientation_line(&out.stdout) {
                return Ok(Some(orientation));
            }
        }
        Ok(None)
    }

    /// Rotate the screen by writing the `user_rotation` setting.
    pub async fn set_orientation(&self, device: &str, orientation: Orientation) -> Result<()> {
        let cmd = format!(
            "settings put system user_rotation {}",
            orientation.rotation_setting()
        );
        self.shell_ok(device, &cmd).await
    }

    /// Model / manufacturer / OS version via `getprop`. Properties that
    /// fail to read are simply omitted.
    pub async fn device_properties(&self, device: &str) -> Result<HashMap<String, String>> {
        const PROPS: [(&str, &str); 3] = [
            ("model", "ro.product.model"),
            ("manufacturer", "ro.product.manufacturer"),
            ("android_version", "ro.build.version.release"),
        ];
        let mut props = HashMap::new();
        for (name, key) in PROPS {
            let Ok(out) = self.shell(device, &format!("getprop {key}")).await else {
                continue;
            };
            let value = out.stdout.trim();
            if out.success() && !value.is_empty() {
                props.insert(name.to_string(), value.to_string());
            }
        }
        Ok(props)
    }
}

// ── Parsing helpers ───────────────────────────────────────────────

fn parse_screen_size(raw: &str) -> Option<(u32, u32)> {
    let line = raw.lines().find(|l| l.contains("Physical size:"))?;
    let (_, dims) = line.split_once("Physical size:")?;
    let (w, h) = dims.trim().split_once('x')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

fn parse_orientation_line(line: &str) -> Option<Orientation> {
    // "SurfaceOrientation: 0" or "mCurrentOrientation=1"
    let tail = line.trim().rsplit([':', '=']).next()?;
    let code: i64 = tail.trim().parse().ok()?;
    Orientation::from_rotation_code(code)
}

fn non_empty(primary: &str, fallback: &str) -> String {
    let primary = primary.trim();
    if primary.is_empty() {
        fallback.trim().to_string()
    } else {
        primary.to_string()
    }
}
