use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::oneshot;

use super::pump_until;
use crate::client::DropboxClient;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::lifecycle::main_loop;
use crate::protocol::ArgumentMap;

/// Parse a `KEY=VALUE` argument. The value may itself contain `=`.
pub fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Send one general command and print the daemon's reply.
/// Returns false when the command failed.
pub async fn run_send(
    config: &BridgeConfig,
    command: &str,
    args: Vec<(String, String)>,
    json: bool,
    timeout: Duration,
) -> Result<bool> {
    let (handle, mut main_loop) = main_loop();
    let client = DropboxClient::new(config, handle);
    client.command().start()?;

    let args: ArgumentMap = args.into_iter().collect();
    let (tx, rx) = oneshot::channel();
    client.send_command(command, args, move |response| {
        let _ = tx.send(response);
    });

    let response = pump_until(&mut main_loop, rx, timeout).await;
    client.shutdown();

    match response? {
        Some(map) => {
            print_response(&map, json)?;
            Ok(true)
        }
        None => {
            println!("command failed");
            Ok(false)
        }
    }
}

/// Run a context menu verb on `paths`.
pub async fn run_action(
    config: &BridgeConfig,
    verb: &str,
    paths: Vec<PathBuf>,
    timeout: Duration,
) -> Result<bool> {
    let (handle, mut main_loop) = main_loop();
    let client = DropboxClient::new(config, handle);
    client.command().start()?;

    let paths: Vec<PathBuf> = paths.iter().map(|p| absolute(p)).collect();
    let (tx, rx) = oneshot::channel();
    client.send_context_action(&paths, verb, move |response| {
        let _ = tx.send(response.is_some());
    });

    let ok = pump_until(&mut main_loop, rx, timeout).await;
    client.shutdown();

    if ok? {
        println!("ok");
        Ok(true)
    } else {
        println!("command failed");
        Ok(false)
    }
}

fn print_response(map: &ArgumentMap, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(map)?);
        return Ok(());
    }
    for (key, values) in map.iter() {
        println!("{}\t{}", key, values.join("\t"));
    }
    Ok(())
}

/// The daemon only understands absolute paths.
pub(crate) fn absolute(path: &std::path::Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
