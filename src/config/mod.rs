pub mod paths;

pub use paths::{SocketPaths, COMMAND_SOCKET_NAME, HOOK_SOCKET_NAME};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Environment variable forcing the debug socket directory.
pub const DEBUG_ENV: &str = "DROPBOX_BRIDGE_DEBUG";

/// Bridge configuration, read from `~/.config/dropbox-bridge/config.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Directory holding the daemon sockets. Default: `~/.dropbox`.
    #[serde(default)]
    pub dropbox_dir: Option<PathBuf>,

    /// Talk to a development daemon under `~/.dropboxlocal`.
    #[serde(default)]
    pub debug: bool,

    /// Delay between connect attempts, in milliseconds. Default: 1000.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    /// How long the command worker waits for work before probing the
    /// connection, in milliseconds. Default: 100.
    #[serde(default = "default_idle_poll")]
    pub idle_poll_ms: u64,

    /// Send `icon_overlay_init` and `on_x_server` on every connect.
    #[serde(default = "default_announce")]
    pub announce_on_connect: bool,
}

fn default_retry_interval() -> u64 {
    1000
}
fn default_idle_poll() -> u64 {
    100
}
fn default_announce() -> bool {
    true
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            dropbox_dir: None,
            debug: false,
            retry_interval_ms: 1000,
            idle_poll_ms: 100,
            announce_on_connect: true,
        }
    }
}

impl BridgeConfig {
    /// Load from a YAML file. Returns the defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|e| BridgeError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load the global config file, then apply environment overrides.
    pub fn load_global() -> Result<Self> {
        let mut config = Self::load_from(&dirs_global().join("config.yml"))?;
        config.apply_env();
        Ok(config)
    }

    /// Apply `DROPBOX_BRIDGE_DEBUG`.
    pub fn apply_env(&mut self) {
        self.apply_debug_override(std::env::var(DEBUG_ENV).ok().as_deref());
    }

    /// The variable can only switch debug mode on, never off.
    fn apply_debug_override(&mut self, value: Option<&str>) {
        if matches!(value.map(str::trim), Some("1" | "true" | "yes")) {
            self.debug = true;
        }
    }

    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            idle_poll: Duration::from_millis(self.idle_poll_ms),
        }
    }

    pub fn socket_paths(&self) -> SocketPaths {
        SocketPaths::resolve(self)
    }
}

/// Timing shared by both channels.
#[derive(Debug, Clone, Copy)]
pub struct ChannelOptions {
    pub retry_interval: Duration,
    pub idle_poll: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        BridgeConfig::default().channel_options()
    }
}

/// Returns the global config directory path: `~/.config/dropbox-bridge/`
pub fn dirs_global() -> PathBuf {
    home_dir().join(".config").join("dropbox-bridge")
}

pub(crate) fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".into()))
}
