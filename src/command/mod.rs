pub mod client;
pub mod connection;
pub mod file_info;
pub mod queue;

pub use client::{CommandClient, RequestSender};
pub use file_info::{canonicalize_path, ContextMenuItem, FileInfo, FileStatus, FolderTag};
pub use queue::RequestQueue;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::lifecycle::MainLoopHandle;
use crate::protocol::ArgumentMap;

/// Completion handler for a general command; `None` means no response.
pub type ResponseHandler = Box<dyn FnOnce(Option<ArgumentMap>) + Send + 'static>;

/// Completion handler for a file-info request; `None` means it failed.
pub type FileInfoHandler = Box<dyn FnOnce(Option<FileInfo>) + Send + 'static>;

/// One request/response exchange on a connected command socket.
pub trait Exchange {
    /// Send `command` with `args` and read the reply. `Ok(None)` is a failure
    /// reported by the daemon; `Err` means the connection is unusable.
    fn exchange(&mut self, command: &str, args: &ArgumentMap) -> Result<Option<ArgumentMap>>;
}

/// A unit of work for the command worker.
pub enum Request {
    FileInfo(FileInfoRequest),
    General(GeneralRequest),
}

impl Request {
    /// Complete this request with a failure result.
    pub(crate) fn fail(self, main_loop: &MainLoopHandle) {
        match self {
            Request::FileInfo(req) => req.complete(None, main_loop),
            Request::General(req) => req.complete(None, main_loop),
        }
    }

    pub fn describe(&self) -> &str {
        match self {
            Request::FileInfo(_) => "file info",
            Request::General(req) => &req.command,
        }
    }
}

impl From<GeneralRequest> for Request {
    fn from(req: GeneralRequest) -> Self {
        Request::General(req)
    }
}

impl From<FileInfoRequest> for Request {
    fn from(req: FileInfoRequest) -> Self {
        Request::FileInfo(req)
    }
}

/// A named command with arguments and an optional completion handler.
pub struct GeneralRequest {
    pub command: String,
    pub args: ArgumentMap,
    handler: Option<ResponseHandler>,
}

impl GeneralRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: ArgumentMap::new(),
            handler: None,
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push(key, value);
        self
    }

    pub fn args(mut self, args: ArgumentMap) -> Self {
        self.args = args;
        self
    }

    pub fn on_complete<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Option<ArgumentMap>) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub(crate) fn complete(self, response: Option<ArgumentMap>, main_loop: &MainLoopHandle) {
        if let Some(handler) = self.handler {
            main_loop.post_or_log("command completion", move || handler(response));
        }
    }
}

/// Cancellation flag shared between the caller and an in-flight request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Status, context options and (for directories) folder tag of one path.
pub struct FileInfoRequest {
    pub path: PathBuf,
    pub is_directory: bool,
    cancel: CancelToken,
    handler: Option<FileInfoHandler>,
}

impl FileInfoRequest {
    /// `path` is canonicalized lexically before it is sent to the daemon.
    pub fn new(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self {
            path: canonicalize_path(&path.into()),
            is_directory,
            cancel: CancelToken::new(),
            handler: None,
        }
    }

    pub fn on_complete<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Option<FileInfo>) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Token the caller keeps to cancel this request.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Deliver `result` on the main loop unless the request was cancelled
    /// by the time the loop gets to it. A cancelled request's handler is
    /// dropped uninvoked.
    pub(crate) fn complete(self, result: Option<FileInfo>, main_loop: &MainLoopHandle) {
        let Some(handler) = self.handler else {
            return;
        };
        let cancel = self.cancel;
        let path = self.path;
        main_loop.post_or_log("file info completion", move || {
            if cancel.is_cancelled() {
                tracing::debug!(path = %path.display(), "file info cancelled, discarding result");
                return;
            }
            handler(result);
        });
    }
}
