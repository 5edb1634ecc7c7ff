use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::connection::Connection;
use super::queue::RequestQueue;
use super::{file_info, CancelToken, Exchange, FileInfoRequest, GeneralRequest, Request};
use crate::config::ChannelOptions;
use crate::error::{BridgeError, Result};
use crate::lifecycle::{ConnectionState, ConnectionStatus, Lifecycle, MainLoopHandle};
use crate::protocol::ArgumentMap;

/// What travels through the request queue.
enum Envelope {
    Request(Request),
    /// Drop the current connection and reconnect.
    Reconnect,
    /// Stop the worker.
    Shutdown,
}

/// Why the worker left a connected session.
enum Stop {
    Fault(BridgeError),
    Reconnect,
    Shutdown,
}

/// Cheap, cloneable enqueueing side of the command channel. Safe to call
/// from any thread at any time, including before the channel connects.
#[derive(Clone)]
pub struct RequestSender {
    queue: Arc<RequestQueue<Envelope>>,
    main_loop: MainLoopHandle,
}

impl RequestSender {
    /// Queue a request. If the channel has shut down the request is failed
    /// immediately instead.
    pub fn request(&self, request: impl Into<Request>) {
        if let Err(Envelope::Request(request)) = self.queue.push(Envelope::Request(request.into())) {
            tracing::debug!(request = request.describe(), "command channel closed, failing request");
            request.fail(&self.main_loop);
        }
    }

    /// Send `command` with `args`; `handler` receives the response, or
    /// `None` if the daemon refused it or the connection failed.
    pub fn send_command<F>(&self, command: &str, args: ArgumentMap, handler: F)
    where
        F: FnOnce(Option<ArgumentMap>) + Send + 'static,
    {
        self.request(GeneralRequest::new(command).args(args).on_complete(handler));
    }

    /// Fire-and-forget command with no arguments.
    pub fn send_simple_command(&self, command: &str) {
        self.request(GeneralRequest::new(command));
    }

    /// Queue the file-info composite. The returned token cancels delivery.
    pub fn request_file_info(&self, request: FileInfoRequest) -> CancelToken {
        let token = request.cancel_token();
        self.request(request);
        token
    }
}

/// The request/response channel: one dedicated worker thread owning the
/// command socket and servicing queued requests strictly in order.
pub struct CommandClient {
    shared: Arc<Shared>,
    sender: RequestSender,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    socket_path: PathBuf,
    queue: Arc<RequestQueue<Envelope>>,
    status: ConnectionStatus,
    lifecycle: Arc<Lifecycle>,
    main_loop: MainLoopHandle,
    options: ChannelOptions,
    stopping: AtomicBool,
}

impl CommandClient {
    pub fn new(
        socket_path: PathBuf,
        options: ChannelOptions,
        lifecycle: Arc<Lifecycle>,
        main_loop: MainLoopHandle,
    ) -> Self {
        let queue = Arc::new(RequestQueue::new());
        let sender = RequestSender {
            queue: queue.clone(),
            main_loop: main_loop.clone(),
        };
        Self {
            shared: Arc::new(Shared {
                socket_path,
                queue,
                status: ConnectionStatus::new(),
                lifecycle,
                main_loop,
                options,
                stopping: AtomicBool::new(false),
            }),
            sender,
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker thread. Only one worker may ever run per client.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        if worker.is_some() || self.shared.queue.is_closed() {
            return Err(BridgeError::AlreadyStarted { channel: "command" });
        }

        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("dropbox-command".into())
            .spawn(move || shared.run())?;
        *worker = Some(handle);
        Ok(())
    }

    /// Stop the worker. Every request still queued is failed.
    pub fn shutdown(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        let _ = self.shared.queue.push(Envelope::Shutdown);

        let started = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some();
        if !started {
            self.shared.fail_all(self.shared.queue.close());
        }
    }

    /// Push a reconnect request, but only while connected; a channel that
    /// is already reconnecting does not need another.
    pub fn force_reconnect(&self) {
        if self.is_connected() {
            tracing::debug!("forcing command channel to reconnect");
            let _ = self.shared.queue.push(Envelope::Reconnect);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.status.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.status.state()
    }

    /// Failed connect attempts since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.shared.status.attempts()
    }

    pub fn socket_path(&self) -> &Path {
        &self.shared.socket_path
    }

    pub fn sender(&self) -> RequestSender {
        self.sender.clone()
    }

    pub fn request(&self, request: impl Into<Request>) {
        self.sender.request(request);
    }

    pub fn send_command<F>(&self, command: &str, args: ArgumentMap, handler: F)
    where
        F: FnOnce(Option<ArgumentMap>) + Send + 'static,
    {
        self.sender.send_command(command, args, handler);
    }

    pub fn send_simple_command(&self, command: &str) {
        self.sender.send_simple_command(command);
    }

    pub fn request_file_info(&self, request: FileInfoRequest) -> CancelToken {
        self.sender.request_file_info(request)
    }
}

impl Drop for CommandClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn run(self: Arc<Self>) {
        tracing::debug!(socket = %self.socket_path.display(), "command worker started");

        while let Some(mut conn) = self.connect() {
            self.status.mark_connected();
            tracing::debug!("command channel connected");
            self.lifecycle.notify_connect();

            let stop = self.serve(&mut conn);
            drop(conn);
            self.status.set(ConnectionState::Faulted);

            match &stop {
                Stop::Fault(e) => tracing::warn!(error = %e, "command channel fault, reconnecting"),
                Stop::Reconnect => tracing::debug!("got a reconnect request"),
                Stop::Shutdown => tracing::debug!("command channel shutting down"),
            }

            self.fail_queued();
            self.status.set(ConnectionState::Disconnected);
            self.lifecycle.notify_disconnect();

            if matches!(stop, Stop::Shutdown) {
                break;
            }
        }

        self.status.set(ConnectionState::Disconnected);
        self.fail_all(self.queue.close());
        tracing::debug!("command worker stopped");
    }

    /// Retry `connect()` at a fixed interval until it succeeds or the
    /// client is shut down. There is no retry cap.
    fn connect(&self) -> Option<Connection> {
        self.status.set(ConnectionState::Connecting);
        loop {
            if self.stopping.load(Ordering::Acquire) {
                return None;
            }
            match Connection::connect(&self.socket_path) {
                Ok(conn) => return Some(conn),
                Err(e) => {
                    let attempt = self.status.record_failed_attempt();
                    tracing::debug!(attempt, error = %e, "command connect failed");
                    self.lifecycle.notify_attempt(attempt);
                    thread::sleep(self.options.retry_interval);
                }
            }
        }
    }

    fn serve(&self, conn: &mut Connection) -> Stop {
        loop {
            if self.stopping.load(Ordering::Acquire) {
                return Stop::Shutdown;
            }

            let Some(envelope) = self.queue.pop_wait(self.options.idle_poll) else {
                if let Err(e) = conn.probe() {
                    return Stop::Fault(e);
                }
                continue;
            };

            match envelope {
                Envelope::Reconnect => return Stop::Reconnect,
                Envelope::Shutdown => return Stop::Shutdown,
                Envelope::Request(request) => {
                    if let Err(e) = self.execute(conn, request) {
                        return Stop::Fault(e);
                    }
                }
            }
        }
    }

    /// Run one request to completion. On error the request has already been
    /// failed and the connection must be dropped.
    fn execute(&self, conn: &mut Connection, request: Request) -> Result<()> {
        match request {
            Request::General(req) => match conn.exchange(&req.command, &req.args) {
                Ok(response) => {
                    if response.is_none() {
                        tracing::debug!(command = %req.command, "daemon reported failure");
                    }
                    req.complete(response, &self.main_loop);
                    Ok(())
                }
                Err(e) => {
                    req.complete(None, &self.main_loop);
                    Err(e)
                }
            },
            Request::FileInfo(req) => match file_info::execute(conn, &req) {
                Ok(info) => {
                    req.complete(info, &self.main_loop);
                    Ok(())
                }
                Err(e) => {
                    req.complete(None, &self.main_loop);
                    Err(e)
                }
            },
        }
    }

    /// Fail everything queued at fault time; nobody knows how long the
    /// channel will stay down.
    fn fail_queued(&self) {
        while let Some(envelope) = self.queue.pop_nowait() {
            if let Envelope::Request(request) = envelope {
                request.fail(&self.main_loop);
            }
        }
    }

    fn fail_all(&self, envelopes: Vec<Envelope>) {
        for envelope in envelopes {
            if let Envelope::Request(request) = envelope {
                request.fail(&self.main_loop);
            }
        }
    }
}
