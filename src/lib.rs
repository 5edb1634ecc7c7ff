pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod hooks;
pub mod lifecycle;
pub mod protocol;

pub use client::DropboxClient;
pub use command::{CancelToken, FileInfo, FileInfoRequest, GeneralRequest, Request};
pub use config::{BridgeConfig, SocketPaths};
pub use error::{BridgeError, Result};
pub use hooks::{HookEvent, HookHandler, HookRegistry};
pub use lifecycle::{main_loop, MainLoop, MainLoopHandle};
pub use protocol::ArgumentMap;
