pub mod file_info;
pub mod send;
pub mod status;
pub mod watch;

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::lifecycle::MainLoop;

/// Flags accepted by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub socket_dir: Option<PathBuf>,
    pub debug: bool,
}

/// Load the config file named by `--config` (else the global one), then
/// layer the command-line overrides on top.
pub fn load_config(args: &GlobalArgs) -> Result<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = BridgeConfig::load_from(path)?;
            config.apply_env();
            config
        }
        None => BridgeConfig::load_global()?,
    };
    if args.debug {
        config.debug = true;
    }
    if let Some(dir) = &args.socket_dir {
        config.dropbox_dir = Some(dir.clone());
    }
    Ok(config)
}

/// Run main-loop jobs until `rx` yields, giving up after `timeout`.
///
/// Completion handlers only run when the loop is pumped, so a caller that
/// waited on `rx` without pumping would wait forever.
pub async fn pump_until<T>(
    main_loop: &mut MainLoop,
    rx: oneshot::Receiver<T>,
    timeout: Duration,
) -> Result<T> {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    tokio::pin!(rx);

    loop {
        tokio::select! {
            biased;
            result = &mut rx => {
                // A dropped sender means the handler was discarded uninvoked.
                return result.map_err(|_| BridgeError::Cancelled);
            }
            more = main_loop.run_once() => {
                if !more {
                    return Err(BridgeError::MainLoopClosed);
                }
            }
            _ = &mut deadline => {
                return Err(BridgeError::Timeout {
                    waited_secs: timeout.as_secs(),
                });
            }
        }
    }
}
