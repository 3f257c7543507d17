//! Configuration for the bridge agent.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use adbridge_core::adb::AdbGateway;
use adbridge_core::stream::{StreamConfig, TranscodeConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Device protocol settings.
    pub adb: AdbConfig,
    /// Screen streaming settings.
    pub stream: StreamSettings,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to accept WebSocket clients on.
    pub listen_addr: String,
}

/// Device protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbConfig {
    /// Path to the adb binary. Empty means auto-detect.
    pub path: String,
    /// Time budget for shell-class commands, in seconds.
    pub shell_timeout_secs: u64,
    /// Time budget for screen capture, in seconds.
    pub capture_timeout_secs: u64,
}

/// Screen streaming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Target frames per second.
    pub fps: u32,
    /// Longest edge of transcoded frames, in pixels.
    pub max_edge: u32,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    /// Consecutive capture failures before a stream gives up.
    pub max_failures: u32,
    /// Pause between capture retries, in milliseconds.
    pub retry_delay_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            adb: AdbConfig::default(),
            stream: StreamSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3002".into(),
        }
    }
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            shell_timeout_secs: 30,
            capture_timeout_secs: 10,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            fps: 60,
            max_edge: 1280,
            jpeg_quality: 85,
            max_failures: 5,
            retry_delay_ms: 50,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl AgentConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Build the gateway described by the `adb` table.
    pub fn gateway(&self) -> adbridge_core::Result<AdbGateway> {
        let gateway = if self.adb.path.is_empty() {
            AdbGateway::new()?
        } else {
            AdbGateway::with_path(self.adb.path.clone().into())
        };
        Ok(gateway.with_timeouts(
            Duration::from_secs(self.adb.shell_timeout_secs.max(1)),
            Duration::from_secs(self.adb.capture_timeout_secs.max(1)),
        ))
    }

    /// Convert streaming settings into a `StreamConfig`.
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig {
            target_fps: self.stream.fps.clamp(1, 60),
            max_consecutive_failures: self.stream.max_failures.max(1),
            retry_delay: Duration::from_millis(self.stream.retry_delay_ms),
            transcode: TranscodeConfig {
                max_edge: self.stream.max_edge.max(64),
                jpeg_quality: self.stream.jpeg_quality.clamp(1, 100),
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
