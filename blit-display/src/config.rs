//! Display service configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use blit_core::{BlitError, StallAction};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Output panel settings.
    pub panel: PanelConfig,
    /// Render-loop watchdog.
    pub watchdog: WatchdogConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind the HTTP/WebSocket server on.
    pub listen_address: String,
    /// HTTP port.
    pub port: u16,
    /// How long to keep retrying the bind before running without a server.
    pub link_timeout_ms: u64,
    /// Largest message body in bytes. Longer POST bodies are cut to this
    /// length; the default fits the largest known frame size (1280x720).
    pub max_payload: usize,
}

/// Output panel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Panel width in pixels.
    pub width: u32,
    /// Panel height in pixels.
    pub height: u32,
    /// RGB565 framebuffer device (e.g. `/dev/fb0`). Empty renders to memory only.
    pub device: String,
}

/// Watchdog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Stall threshold in milliseconds.
    pub timeout_ms: u64,
    /// Terminate the process on a stall instead of logging.
    pub abort_on_stall: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            panel: PanelConfig::default(),
            watchdog: WatchdogConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".into(),
            port: 81,
            link_timeout_ms: 10_000,
            max_payload: 2 * 1024 * 1024,
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            width: 720,
            height: 1280,
            device: String::new(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            abort_on_stall: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl DisplayConfig {
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

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let cfg = Self::default();
        let text = toml::to_string_pretty(&cfg).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }
}

impl NetworkConfig {
    /// Socket address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr, BlitError> {
        let ip: IpAddr = self.listen_address.parse().map_err(|e| {
            BlitError::Config(format!("listen_address {:?}: {e}", self.listen_address))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }
}

impl WatchdogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(100))
    }

    pub fn action(&self) -> StallAction {
        if self.abort_on_stall {
            StallAction::Abort
        } else {
            StallAction::Warn
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
