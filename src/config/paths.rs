use std::path::{Path, PathBuf};

use super::{home_dir, BridgeConfig};

pub const COMMAND_SOCKET_NAME: &str = "command_socket";
pub const HOOK_SOCKET_NAME: &str = "iface_socket";

/// Locations of the two daemon sockets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketPaths {
    pub command: PathBuf,
    pub hooks: PathBuf,
}

impl SocketPaths {
    /// Both sockets inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            command: dir.join(COMMAND_SOCKET_NAME),
            hooks: dir.join(HOOK_SOCKET_NAME),
        }
    }

    /// The configured directory, else `~/.dropbox` (`~/.dropboxlocal` in
    /// debug mode).
    pub fn resolve(config: &BridgeConfig) -> Self {
        if let Some(dir) = &config.dropbox_dir {
            return Self::in_dir(dir);
        }
        let dir_name = if config.debug {
            ".dropboxlocal"
        } else {
            ".dropbox"
        };
        Self::in_dir(&home_dir().join(dir_name))
    }
}
