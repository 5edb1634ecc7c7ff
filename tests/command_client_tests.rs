//! Integration tests for the command channel against a scripted daemon.

mod common;

use std::io::Write;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use common::{pump_until, wait_for, FakeDaemon, Reply};
use dropbox_bridge::command::{CommandClient, FileInfo, FileInfoRequest, FileStatus, FolderTag};
use dropbox_bridge::config::{ChannelOptions, COMMAND_SOCKET_NAME};
use dropbox_bridge::error::BridgeError;
use dropbox_bridge::lifecycle::{main_loop, Lifecycle, MainLoop};
use dropbox_bridge::protocol::ArgumentMap;

const WAIT: Duration = Duration::from_secs(5);

fn fast_options() -> ChannelOptions {
    ChannelOptions {
        retry_interval: Duration::from_millis(20),
        idle_poll: Duration::from_millis(20),
    }
}

struct Harness {
    _dir: TempDir,
    socket: PathBuf,
    client: CommandClient,
    lifecycle: Arc<Lifecycle>,
    main_loop: MainLoop,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join(COMMAND_SOCKET_NAME);
    let (handle, main_loop) = main_loop();
    let lifecycle = Arc::new(Lifecycle::new(handle.clone()));
    let client = CommandClient::new(socket.clone(), fast_options(), lifecycle.clone(), handle);
    Harness {
        _dir: dir,
        socket,
        client,
        lifecycle,
        main_loop,
    }
}

type Results = Arc<Mutex<Vec<(String, Option<ArgumentMap>)>>>;

fn send(client: &CommandClient, results: &Results, command: &str) {
    let results = results.clone();
    let name = command.to_string();
    client.send_command(command, ArgumentMap::new(), move |response| {
        results.lock().unwrap().push((name, response));
    });
}

fn ok_with(key: &str, value: &str) -> Reply {
    Reply::Ok(ArgumentMap::new().with(key, value))
}

// ---------------------------------------------------------------------------
// Ordering and exactly-once completion
// ---------------------------------------------------------------------------

#[test]
fn responses_arrive_once_each_in_fifo_order() {
    let mut h = harness();
    let daemon = FakeDaemon::start(&h.socket, |command, _| ok_with("echo", command));
    h.client.start().unwrap();

    let results: Results = Arc::default();
    for i in 0..5 {
        send(&h.client, &results, &format!("cmd{i}"));
    }

    assert!(pump_until(&mut h.main_loop, WAIT, || results.lock().unwrap().len() == 5));
    // Anything late would show up now.
    thread::sleep(Duration::from_millis(100));
    h.main_loop.run_pending();

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 5);
    for (i, (name, response)) in results.iter().enumerate() {
        assert_eq!(name, &format!("cmd{i}"));
        assert_eq!(response.as_ref().unwrap().first("echo"), Some(name.as_str()));
    }
    assert_eq!(daemon.commands(), vec!["cmd0", "cmd1", "cmd2", "cmd3", "cmd4"]);
}

#[test]
fn arguments_reach_the_daemon_with_values_in_order() {
    let mut h = harness();
    let daemon = FakeDaemon::always_ok(&h.socket);
    h.client.start().unwrap();

    let done = Arc::new(AtomicUsize::new(0));
    let counter = done.clone();
    let args = ArgumentMap::new()
        .with("paths", "/a\tb")
        .with("paths", "/c\nd")
        .with("verb", "share");
    h.client
        .send_command("icon_overlay_context_action", args.clone(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    assert!(pump_until(&mut h.main_loop, WAIT, || done.load(Ordering::SeqCst) == 1));
    assert_eq!(
        daemon.received(),
        vec![("icon_overlay_context_action".to_string(), args)]
    );
}

#[test]
fn requests_queued_before_the_daemon_exists_are_delivered() {
    let mut h = harness();
    h.client.start().unwrap();

    let results: Results = Arc::default();
    send(&h.client, &results, "early");
    assert!(wait_for(WAIT, || h.client.attempts() >= 2));
    assert!(!h.client.is_connected());

    let _daemon = FakeDaemon::always_ok(&h.socket);
    assert!(pump_until(&mut h.main_loop, WAIT, || results.lock().unwrap().len() == 1));
    assert!(results.lock().unwrap()[0].1.is_some());
    assert!(h.client.is_connected());
    assert_eq!(h.client.attempts(), 0);
}

#[test]
fn simple_command_needs_no_handler() {
    let mut h = harness();
    let daemon = FakeDaemon::always_ok(&h.socket);
    h.client.start().unwrap();

    h.client.send_simple_command("icon_overlay_init");
    assert!(pump_until(&mut h.main_loop, WAIT, || daemon.commands()
        == vec!["icon_overlay_init"]));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn daemon_failure_fails_only_that_request() {
    let mut h = harness();
    let daemon = FakeDaemon::start(&h.socket, |command, _| {
        if command == "bad" {
            Reply::Fail
        } else {
            Reply::Ok(ArgumentMap::new())
        }
    });
    h.client.start().unwrap();

    let results: Results = Arc::default();
    send(&h.client, &results, "bad");
    send(&h.client, &results, "good");

    assert!(pump_until(&mut h.main_loop, WAIT, || results.lock().unwrap().len() == 2));
    let results = results.lock().unwrap();
    assert!(results[0].1.is_none());
    assert!(results[1].1.is_some());
    assert_eq!(daemon.connections(), 1);
}

#[test]
fn twenty_argument_lines_fault_the_channel_and_fail_queued_work() {
    let mut h = harness();
    let daemon = FakeDaemon::start(&h.socket, |command, _| {
        if command == "flood" {
            let mut raw = String::from("ok\n");
            for i in 0..20 {
                raw.push_str(&format!("k{i}\tv\n"));
            }
            raw.push_str("done\n");
            Reply::Raw(raw.into_bytes())
        } else {
            Reply::Ok(ArgumentMap::new())
        }
    });

    let disconnects = Arc::new(AtomicUsize::new(0));
    let counter = disconnects.clone();
    h.lifecycle.add_on_disconnect(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // Everything is queued before the worker connects.
    let results: Results = Arc::default();
    send(&h.client, &results, "flood");
    send(&h.client, &results, "a");
    send(&h.client, &results, "b");
    h.client.start().unwrap();

    assert!(pump_until(&mut h.main_loop, WAIT, || results.lock().unwrap().len() == 3));
    {
        let results = results.lock().unwrap();
        let names: Vec<_> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["flood", "a", "b"]);
        assert!(results.iter().all(|(_, response)| response.is_none()));
    }
    assert!(pump_until(&mut h.main_loop, WAIT, || disconnects
        .load(Ordering::SeqCst)
        >= 1));
    assert_eq!(daemon.commands(), vec!["flood"]);

    // The channel comes back on its own.
    assert!(wait_for(WAIT, || daemon.connections() == 2 && h.client.is_connected()));
}

#[test]
fn unsolicited_bytes_while_idle_fault_the_channel() {
    let mut h = harness();
    let listener = UnixListener::bind(&h.socket).unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let count = accepted.clone();
    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            count.fetch_add(1, Ordering::SeqCst);
            let _ = stream.write_all(b"surprise\n");
            held.push(stream);
        }
    });

    let disconnects = Arc::new(AtomicUsize::new(0));
    let counter = disconnects.clone();
    h.lifecycle.add_on_disconnect(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    h.client.start().unwrap();

    assert!(pump_until(&mut h.main_loop, WAIT, || disconnects
        .load(Ordering::SeqCst)
        >= 1));
    assert!(wait_for(WAIT, || accepted.load(Ordering::SeqCst) >= 2));
}

#[test]
fn peer_hangup_mid_request_fails_it() {
    let mut h = harness();
    let _daemon = FakeDaemon::start(&h.socket, |command, _| {
        if command == "hangup" {
            Reply::Close
        } else {
            Reply::Ok(ArgumentMap::new())
        }
    });
    h.client.start().unwrap();

    let results: Results = Arc::default();
    send(&h.client, &results, "hangup");
    assert!(pump_until(&mut h.main_loop, WAIT, || results.lock().unwrap().len() == 1));
    assert!(results.lock().unwrap()[0].1.is_none());

    send(&h.client, &results, "after");
    assert!(pump_until(&mut h.main_loop, WAIT, || results.lock().unwrap().len() == 2));
    assert!(results.lock().unwrap()[1].1.is_some());
}

// ---------------------------------------------------------------------------
// Connection lifecycle
// ---------------------------------------------------------------------------

#[test]
fn attempt_counter_counts_up_and_restarts_after_connect() {
    let mut h = harness();
    let events = Arc::new(Mutex::new(Vec::<String>::new()));

    let log = events.clone();
    h.lifecycle
        .add_on_connection_attempt(move |n| log.lock().unwrap().push(n.to_string()));
    let log = events.clone();
    h.lifecycle
        .add_on_connect(move || log.lock().unwrap().push("connected".into()));

    h.client.start().unwrap();
    assert!(wait_for(WAIT, || h.client.attempts() >= 3));

    let daemon = FakeDaemon::start(&h.socket, |command, _| {
        if command == "bye" {
            Reply::Close
        } else {
            Reply::Ok(ArgumentMap::new())
        }
    });
    assert!(pump_until(&mut h.main_loop, WAIT, || events
        .lock()
        .unwrap()
        .contains(&"connected".to_string())));

    // Unlink the socket so the next connect fails, then make the daemon
    // drop the live connection.
    std::fs::remove_file(&daemon.path).unwrap();
    h.client.send_simple_command("bye");

    assert!(pump_until(&mut h.main_loop, WAIT, || {
        let events = events.lock().unwrap();
        let connected = events.iter().position(|e| e == "connected").unwrap();
        events.len() > connected + 2
    }));

    let events = events.lock().unwrap();
    let connected = events.iter().position(|e| e == "connected").unwrap();
    let before: Vec<u32> = events[..connected].iter().map(|e| e.parse().unwrap()).collect();
    let expected: Vec<u32> = (1..=before.len() as u32).collect();
    assert_eq!(before, expected);
    assert_eq!(&events[connected + 1..connected + 3], ["1", "2"]);
}

#[test]
fn force_reconnect_drops_a_live_connection() {
    let mut h = harness();
    let daemon = FakeDaemon::always_ok(&h.socket);
    let connects = Arc::new(AtomicUsize::new(0));
    let counter = connects.clone();
    h.lifecycle.add_on_connect(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    h.client.start().unwrap();

    assert!(pump_until(&mut h.main_loop, WAIT, || connects.load(Ordering::SeqCst) == 1));
    h.client.force_reconnect();
    assert!(pump_until(&mut h.main_loop, WAIT, || connects.load(Ordering::SeqCst) == 2));
    assert!(wait_for(WAIT, || daemon.connections() == 2));
}

#[test]
fn force_reconnect_is_a_noop_while_disconnected() {
    let mut h = harness();
    h.client.start().unwrap();
    assert!(wait_for(WAIT, || h.client.attempts() >= 1));
    h.client.force_reconnect();

    let daemon = FakeDaemon::always_ok(&h.socket);
    assert!(wait_for(WAIT, || h.client.is_connected()));
    thread::sleep(Duration::from_millis(200));
    h.main_loop.run_pending();
    assert_eq!(daemon.connections(), 1);
}

#[test]
fn starting_twice_is_an_error() {
    let h = harness();
    h.client.start().unwrap();
    assert!(matches!(
        h.client.start(),
        Err(BridgeError::AlreadyStarted { channel: "command" })
    ));
}

#[test]
fn shutdown_fails_queued_and_later_requests() {
    let mut h = harness();
    h.client.start().unwrap();

    let results: Results = Arc::default();
    send(&h.client, &results, "one");
    send(&h.client, &results, "two");
    h.client.shutdown();
    send(&h.client, &results, "three");

    assert!(pump_until(&mut h.main_loop, WAIT, || results.lock().unwrap().len() == 3));
    thread::sleep(Duration::from_millis(100));
    h.main_loop.run_pending();

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|(_, response)| response.is_none()));
}

// ---------------------------------------------------------------------------
// File info composite
// ---------------------------------------------------------------------------

fn file_info_daemon(socket: &Path) -> FakeDaemon {
    FakeDaemon::start(socket, |command, _| match command {
        "icon_overlay_file_status" => ok_with("status", "up to date"),
        "icon_overlay_context_options" => Reply::Ok(
            ArgumentMap::new()
                .with("options", "Share~Invite people~share")
                .with("options", "broken entry"),
        ),
        "get_folder_tag" => ok_with("tag", "shared"),
        _ => Reply::Ok(ArgumentMap::new()),
    })
}

type InfoSlot = Arc<Mutex<Vec<Option<FileInfo>>>>;

fn request_info(client: &CommandClient, slot: &InfoSlot, path: &str, dir: bool) -> dropbox_bridge::CancelToken {
    let slot = slot.clone();
    client.request_file_info(
        FileInfoRequest::new(path, dir).on_complete(move |info| slot.lock().unwrap().push(info)),
    )
}

#[test]
fn directory_file_info_runs_three_exchanges() {
    let mut h = harness();
    let daemon = file_info_daemon(&h.socket);
    h.client.start().unwrap();

    let slot: InfoSlot = Arc::default();
    request_info(&h.client, &slot, "/home/u/Dropbox/./Photos//", true);
    assert!(pump_until(&mut h.main_loop, WAIT, || slot.lock().unwrap().len() == 1));

    let info = slot.lock().unwrap()[0].clone().unwrap();
    assert_eq!(info.status, FileStatus::UpToDate);
    assert_eq!(info.folder_tag, Some(FolderTag::Shared));
    assert_eq!(info.options.len(), 1);
    assert_eq!(info.options[0].verb, "share");

    let received = daemon.received();
    let commands: Vec<_> = received.iter().map(|(c, _)| c.as_str()).collect();
    assert_eq!(
        commands,
        vec!["icon_overlay_file_status", "icon_overlay_context_options", "get_folder_tag"]
    );
    assert_eq!(received[0].1.first("path"), Some("/home/u/Dropbox/Photos"));
    assert_eq!(received[1].1.first("paths"), Some("/home/u/Dropbox/Photos"));
    assert_eq!(received[2].1.first("path"), Some("/home/u/Dropbox/Photos"));
}

#[test]
fn file_info_for_a_file_skips_the_folder_tag() {
    let mut h = harness();
    let daemon = file_info_daemon(&h.socket);
    h.client.start().unwrap();

    let slot: InfoSlot = Arc::default();
    request_info(&h.client, &slot, "/home/u/Dropbox/notes.txt", false);
    assert!(pump_until(&mut h.main_loop, WAIT, || slot.lock().unwrap().len() == 1));

    let info = slot.lock().unwrap()[0].clone().unwrap();
    assert_eq!(info.folder_tag, None);
    assert_eq!(daemon.commands().len(), 2);
}

#[test]
fn refused_status_fails_the_composite_without_further_exchanges() {
    let mut h = harness();
    let daemon = FakeDaemon::start(&h.socket, |command, _| match command {
        "icon_overlay_file_status" => Reply::Fail,
        _ => ok_with("options", "a~b~c"),
    });
    h.client.start().unwrap();

    let slot: InfoSlot = Arc::default();
    request_info(&h.client, &slot, "/home/u/Dropbox/x", true);
    assert!(pump_until(&mut h.main_loop, WAIT, || slot.lock().unwrap().len() == 1));

    assert!(slot.lock().unwrap()[0].is_none());
    assert_eq!(daemon.commands(), vec!["icon_overlay_file_status"]);
    assert_eq!(daemon.connections(), 1);
}

#[test]
fn cancelled_file_info_is_never_delivered() {
    let mut h = harness();
    let daemon = file_info_daemon(&h.socket);
    h.client.start().unwrap();

    let slot: InfoSlot = Arc::default();
    let token = request_info(&h.client, &slot, "/home/u/Dropbox/Photos", true);
    assert!(wait_for(WAIT, || daemon.commands().len() == 3));
    token.cancel();

    // A later request's completion is queued behind the cancelled one.
    let results: Results = Arc::default();
    send(&h.client, &results, "marker");
    assert!(pump_until(&mut h.main_loop, WAIT, || results.lock().unwrap().len() == 1));

    assert!(slot.lock().unwrap().is_empty());
}

#[test]
fn file_info_is_not_interleaved_with_later_requests() {
    let mut h = harness();
    let daemon = file_info_daemon(&h.socket);

    // Both are queued before the worker runs, so it sees them back to back.
    let slot: InfoSlot = Arc::default();
    let results: Results = Arc::default();
    request_info(&h.client, &slot, "/home/u/Dropbox/Photos", true);
    send(&h.client, &results, "after");
    h.client.start().unwrap();

    assert!(pump_until(&mut h.main_loop, WAIT, || {
        slot.lock().unwrap().len() == 1 && results.lock().unwrap().len() == 1
    }));
    assert!(slot.lock().unwrap()[0].is_some());
    assert_eq!(
        daemon.commands(),
        vec![
            "icon_overlay_file_status",
            "icon_overlay_context_options",
            "get_folder_tag",
            "after"
        ]
    );
}
