use std::path::Path;
use std::time::Duration;

use tokio::sync::oneshot;

use super::pump_until;
use super::send::absolute;
use crate::client::DropboxClient;
use crate::command::{FileInfo, FileInfoRequest};
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::lifecycle::main_loop;

/// Ask the daemon for the status, context options and (for directories)
/// folder tag of `path`. Returns false when the lookup failed.
pub async fn run_file_info(
    config: &BridgeConfig,
    path: &Path,
    is_directory: bool,
    json: bool,
    timeout: Duration,
) -> Result<bool> {
    let (handle, mut main_loop) = main_loop();
    let client = DropboxClient::new(config, handle);
    client.command().start()?;

    let (tx, rx) = oneshot::channel();
    let request = FileInfoRequest::new(absolute(path), is_directory).on_complete(move |info| {
        let _ = tx.send(info);
    });
    client.request_file_info(request);

    let info = pump_until(&mut main_loop, rx, timeout).await;
    client.shutdown();

    match info? {
        Some(info) if json => {
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(true)
        }
        Some(info) => {
            print!("{}", render(&info));
            Ok(true)
        }
        None => {
            println!("command failed");
            Ok(false)
        }
    }
}

fn render(info: &FileInfo) -> String {
    let mut out = format!("status: {}\n", info.status);
    if let Some(tag) = &info.folder_tag {
        out.push_str(&format!("tag: {}\n", tag));
    }
    if !info.options.is_empty() {
        out.push_str("options:\n");
        for item in &info.options {
            out.push_str(&format!("  {}\t{}\t{}\n", item.verb, item.title, item.tooltip));
        }
    }
    out
}
