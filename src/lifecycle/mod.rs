pub mod main_loop;

pub use main_loop::{main_loop, Job, MainLoop, MainLoopHandle};

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

/// Observer fired when the command channel connects or a channel drops.
pub type ConnectHook = Arc<dyn Fn() + Send + Sync>;

/// Observer fired after each failed connect, with the attempt number.
pub type AttemptHook = Arc<dyn Fn(u32) + Send + Sync>;

/// Connect/disconnect/connection-attempt observer lists.
///
/// Observers are appended and never removed: the lists live as long as the
/// client, which lives as long as the host process. Any user context an
/// observer needs is captured by the closure. Notifications are posted to the
/// main loop and run there in registration order.
pub struct Lifecycle {
    on_connect: RwLock<Vec<ConnectHook>>,
    on_disconnect: RwLock<Vec<ConnectHook>>,
    on_attempt: RwLock<Vec<AttemptHook>>,
    main_loop: MainLoopHandle,
}

impl Lifecycle {
    pub fn new(main_loop: MainLoopHandle) -> Self {
        Self {
            on_connect: RwLock::new(Vec::new()),
            on_disconnect: RwLock::new(Vec::new()),
            on_attempt: RwLock::new(Vec::new()),
            main_loop,
        }
    }

    pub fn add_on_connect<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut hooks = self.on_connect.write().unwrap_or_else(|e| e.into_inner());
        hooks.push(Arc::new(hook));
    }

    pub fn add_on_disconnect<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut hooks = self
            .on_disconnect
            .write()
            .unwrap_or_else(|e| e.into_inner());
        hooks.push(Arc::new(hook));
    }

    pub fn add_on_connection_attempt<F>(&self, hook: F)
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        let mut hooks = self.on_attempt.write().unwrap_or_else(|e| e.into_inner());
        hooks.push(Arc::new(hook));
    }

    pub(crate) fn notify_connect(&self) {
        let hooks = snapshot(&self.on_connect);
        self.main_loop.post_or_log("connect notification", move || {
            for hook in &hooks {
                hook();
            }
        });
    }

    pub(crate) fn notify_disconnect(&self) {
        let hooks = snapshot(&self.on_disconnect);
        self.main_loop.post_or_log("disconnect notification", move || {
            for hook in &hooks {
                hook();
            }
        });
    }

    pub(crate) fn notify_attempt(&self, attempt: u32) {
        let hooks = snapshot(&self.on_attempt);
        self.main_loop
            .post_or_log("connection attempt notification", move || {
                for hook in &hooks {
                    hook(attempt);
                }
            });
    }
}

fn snapshot<T: Clone>(list: &RwLock<Vec<T>>) -> Vec<T> {
    list.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Connection state of the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    /// Transient: the connection failed and queued work is being failed.
    Faulted = 3,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Faulted,
            _ => Self::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Lock-free, thread-safe view of a channel's state and its failed
/// connect attempt counter.
#[derive(Debug)]
pub struct ConnectionStatus {
    state: AtomicU8,
    attempts: AtomicU32,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Failed connect attempts since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn record_failed_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn mark_connected(&self) {
        self.attempts.store(0, Ordering::Release);
        self.set(ConnectionState::Connected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn observers_fire_in_registration_order_on_main_loop() {
        let (handle, mut main_loop) = main_loop();
        let lifecycle = Lifecycle::new(handle);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["tray", "file-info"] {
            let seen = seen.clone();
            lifecycle.add_on_connect(move || seen.lock().unwrap().push(format!("{name}:up")));
        }
        let seen_attempts = seen.clone();
        lifecycle.add_on_connection_attempt(move |n| {
            seen_attempts.lock().unwrap().push(format!("attempt:{n}"))
        });

        lifecycle.notify_attempt(1);
        lifecycle.notify_connect();
        assert!(seen.lock().unwrap().is_empty());

        main_loop.run_pending();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["attempt:1", "tray:up", "file-info:up"]
        );
    }

    #[test]
    fn attempts_reset_on_connect() {
        let status = ConnectionStatus::new();
        assert_eq!(status.record_failed_attempt(), 1);
        assert_eq!(status.record_failed_attempt(), 2);
        assert!(!status.is_connected());

        status.mark_connected();
        assert!(status.is_connected());
        assert_eq!(status.attempts(), 0);
        assert_eq!(status.record_failed_attempt(), 1);
    }
}
