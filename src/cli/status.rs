use std::time::{Duration, Instant};

use crate::client::DropboxClient;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::lifecycle::main_loop;

const POLL: Duration = Duration::from_millis(50);

/// Report whether the daemon's command socket accepts us within `wait`.
/// Returns false when it does not.
pub async fn run_status(config: &BridgeConfig, wait: Duration) -> Result<bool> {
    let (handle, mut main_loop) = main_loop();
    let client = DropboxClient::new(config, handle);
    client.command().start()?;

    let deadline = Instant::now() + wait;
    while !client.is_connected() && Instant::now() < deadline {
        main_loop.run_pending();
        tokio::time::sleep(POLL).await;
    }

    let connected = client.is_connected();
    let attempts = client.command().attempts();
    client.shutdown();

    if connected {
        println!("connected");
    } else {
        println!("disconnected (attempts: {})", attempts);
        eprintln!(
            "dropbox-bridge: no daemon at {}",
            client.command().socket_path().display()
        );
    }
    Ok(connected)
}
