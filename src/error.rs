use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("connect to {path} failed: {reason}")]
    ConnectFailed { path: PathBuf, reason: String },

    #[error("protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    #[error("daemon closed the connection")]
    PeerClosed,

    #[error("request cancelled")]
    Cancelled,

    #[error("{channel} channel already started")]
    AlreadyStarted { channel: &'static str },

    #[error("main loop is no longer running")]
    MainLoopClosed,

    #[error("timed out after {waited_secs}s")]
    Timeout { waited_secs: u64 },

    #[error("config parse error in {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }

    /// Whether this error leaves the socket in an unknown state, so the
    /// channel must be torn down and reconnected.
    pub fn is_channel_fault(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation { .. } | Self::PeerClosed | Self::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
