use chrono::Local;

use crate::client::DropboxClient;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::hooks::KNOWN_EVENTS;
use crate::lifecycle::main_loop;
use crate::protocol::ArgumentMap;

/// Print hook events as the daemon pushes them. Runs until interrupted.
/// With no `events` every known event is printed.
pub async fn run_watch(config: &BridgeConfig, events: Vec<String>) -> Result<()> {
    let (handle, mut main_loop) = main_loop();
    let client = DropboxClient::new(config, handle);

    let events = if events.is_empty() {
        KNOWN_EVENTS.iter().map(|e| e.to_string()).collect()
    } else {
        events
    };
    for event in &events {
        let name = event.clone();
        client.add_hook(event, move |args: &ArgumentMap| {
            println!("{}", format_event(&name, args, &Local::now().format("%H:%M:%S").to_string()));
        });
    }
    client.add_on_disconnect(|| eprintln!("dropbox-bridge: hook socket disconnected, retrying"));

    client.hooks().start()?;
    eprintln!(
        "dropbox-bridge: watching {}",
        client.hooks().socket_path().display()
    );
    eprintln!("Press Ctrl+C to stop.\n");

    tokio::select! {
        _ = main_loop.run() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    client.shutdown();
    Ok(())
}

/// `[HH:MM:SS] name key=v1,v2 ...`
fn format_event(name: &str, args: &ArgumentMap, time: &str) -> String {
    let mut line = format!("[{}] {}", time, name);
    for (key, values) in args.iter() {
        line.push_str(&format!(" {}={}", key, values.join(",")));
    }
    line
}
