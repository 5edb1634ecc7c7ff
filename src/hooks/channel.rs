use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UnixStream;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::{HookEvent, HookParser, HookRegistry};
use crate::config::ChannelOptions;
use crate::error::{BridgeError, Result};
use crate::lifecycle::{ConnectionState, ConnectionStatus, Lifecycle, MainLoopHandle};

const READ_CHUNK: usize = 4096;

/// The push-event channel. A tokio task owns the hook socket, reads it
/// whenever it becomes readable and hands each complete event to the main
/// loop for dispatch.
pub struct HookChannel {
    shared: Arc<Shared>,
    task: Mutex<TaskSlot>,
    connected: watch::Receiver<bool>,
}

enum TaskSlot {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

struct Shared {
    socket_path: PathBuf,
    options: ChannelOptions,
    registry: Arc<HookRegistry>,
    lifecycle: Arc<Lifecycle>,
    main_loop: MainLoopHandle,
    status: ConnectionStatus,
    connected: watch::Sender<bool>,
    shutdown_signal: Notify,
}

impl HookChannel {
    pub fn new(
        socket_path: PathBuf,
        options: ChannelOptions,
        registry: Arc<HookRegistry>,
        lifecycle: Arc<Lifecycle>,
        main_loop: MainLoopHandle,
    ) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                socket_path,
                options,
                registry,
                lifecycle,
                main_loop,
                status: ConnectionStatus::new(),
                connected: tx,
                shutdown_signal: Notify::new(),
            }),
            task: Mutex::new(TaskSlot::Idle),
            connected: rx,
        }
    }

    /// Spawn the reader task on the current tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if !matches!(*task, TaskSlot::Idle) {
            return Err(BridgeError::AlreadyStarted { channel: "hook" });
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BridgeError::Io(io::Error::other(e.to_string())))?;
        let shared = self.shared.clone();
        *task = TaskSlot::Running(runtime.spawn(shared.run()));
        Ok(())
    }

    /// Stop the reader task and close the socket.
    pub fn shutdown(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let TaskSlot::Running(handle) = std::mem::replace(&mut *task, TaskSlot::Stopped) {
            self.shared.shutdown_signal.notify_one();
            drop(handle);
        }
        self.shared.status.set(ConnectionState::Disconnected);
        self.shared.connected.send_replace(false);
    }

    pub fn is_connected(&self) -> bool {
        self.shared.status.is_connected()
    }

    /// Failed connect attempts since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.shared.status.attempts()
    }

    /// Wait until the channel is connected, up to `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.connected.clone();
        let connected = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|connected| *connected)).await,
            Ok(Ok(_))
        );
        connected
    }

    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.shared.registry
    }

    pub fn socket_path(&self) -> &Path {
        &self.shared.socket_path
    }
}

impl Drop for HookChannel {
    fn drop(&mut self) {
        let task = self.task.get_mut().unwrap_or_else(|e| e.into_inner());
        if let TaskSlot::Running(handle) = task {
            handle.abort();
        }
    }
}

impl Shared {
    async fn run(self: Arc<Self>) {
        tracing::debug!(socket = %self.socket_path.display(), "hook reader started");
        tokio::select! {
            _ = self.shutdown_signal.notified() => {
                tracing::debug!("hook channel shutting down");
            }
            _ = self.reactor() => {}
        }
        // The reactor may have connected after shutdown() reset the state.
        self.status.set(ConnectionState::Disconnected);
        self.connected.send_replace(false);
    }

    /// Connect, read until the connection breaks, reconnect. Never returns.
    async fn reactor(&self) {
        loop {
            let stream = self.connect().await;
            self.status.mark_connected();
            self.connected.send_replace(true);
            tracing::debug!("hook channel connected");

            match self.pump(&stream).await {
                Err(BridgeError::PeerClosed) => tracing::debug!("daemon closed the hook socket"),
                Err(e) => tracing::warn!(error = %e, "hook channel fault, reconnecting"),
                Ok(()) => {}
            }
            drop(stream);

            self.status.set(ConnectionState::Disconnected);
            self.connected.send_replace(false);
            self.lifecycle.notify_disconnect();
        }
    }

    async fn connect(&self) -> UnixStream {
        self.status.set(ConnectionState::Connecting);
        loop {
            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => return stream,
                Err(e) => {
                    let attempt = self.status.record_failed_attempt();
                    tracing::trace!(attempt, error = %e, "hook connect failed");
                    tokio::time::sleep(self.options.retry_interval).await;
                }
            }
        }
    }

    /// Read whatever is available each time the socket becomes readable and
    /// dispatch every event it completes. Partial events carry over to the
    /// next read. Only returns on error.
    async fn pump(&self, stream: &UnixStream) -> Result<()> {
        let mut parser = HookParser::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            stream.readable().await?;
            match stream.try_read(&mut buf) {
                Ok(0) => return Err(BridgeError::PeerClosed),
                Ok(n) => {
                    parser.push(&buf[..n]);
                    while let Some(event) = parser.next_event()? {
                        self.dispatch(event);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn dispatch(&self, event: HookEvent) {
        tracing::debug!(event = %event.name, "hook event received");
        let registry = self.registry.clone();
        self.main_loop.post_or_log("hook event", move || {
            registry.dispatch(&event);
        });
    }
}
