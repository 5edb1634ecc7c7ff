//! Scripted stand-ins for the daemon's two sockets.

#![allow(dead_code)]

use std::io::{BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use dropbox_bridge::lifecycle::MainLoop;
use dropbox_bridge::protocol::codec::{encode_ok_response, read_message};
use dropbox_bridge::protocol::ArgumentMap;

/// What the fake daemon does with one request.
pub enum Reply {
    Ok(ArgumentMap),
    /// A non-`ok` response block.
    Fail,
    /// Arbitrary bytes, written as-is.
    Raw(Vec<u8>),
    /// Hang up without answering.
    Close,
}

type Script = dyn Fn(&str, &ArgumentMap) -> Reply + Send + Sync;

/// A command socket that answers every request through `script` and
/// records what it was sent.
pub struct FakeDaemon {
    pub path: PathBuf,
    received: Arc<Mutex<Vec<(String, ArgumentMap)>>>,
    connections: Arc<AtomicUsize>,
}

impl FakeDaemon {
    pub fn start<F>(path: &Path, script: F) -> Self
    where
        F: Fn(&str, &ArgumentMap) -> Reply + Send + Sync + 'static,
    {
        let listener = UnixListener::bind(path).unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let script: Arc<Script> = Arc::new(script);

        let log = received.clone();
        let count = connections.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                count.fetch_add(1, Ordering::SeqCst);
                let log = log.clone();
                let script = script.clone();
                thread::spawn(move || serve(stream, &log, &*script));
            }
        });

        Self {
            path: path.to_path_buf(),
            received,
            connections,
        }
    }

    /// Answer `ok` with no arguments to everything.
    pub fn always_ok(path: &Path) -> Self {
        Self::start(path, |_, _| Reply::Ok(ArgumentMap::new()))
    }

    pub fn received(&self) -> Vec<(String, ArgumentMap)> {
        self.received.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.received().into_iter().map(|(name, _)| name).collect()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn serve(stream: UnixStream, log: &Mutex<Vec<(String, ArgumentMap)>>, script: &Script) {
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);
    while let Ok((command, args)) = read_message(&mut reader) {
        log.lock().unwrap().push((command.clone(), args.clone()));
        let bytes = match script(&command, &args) {
            Reply::Ok(args) => encode_ok_response(&args),
            Reply::Fail => b"notok\nreason\tnope\ndone\n".to_vec(),
            Reply::Raw(bytes) => bytes,
            Reply::Close => return,
        };
        if writer.write_all(&bytes).is_err() {
            return;
        }
    }
}

/// Pump `main_loop` until `cond` holds or `timeout` passes.
pub fn pump_until(main_loop: &mut MainLoop, timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        main_loop.run_pending();
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// Poll `cond` without pumping anything.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}
