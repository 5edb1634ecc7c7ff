use std::path::PathBuf;
use std::sync::Arc;

use crate::command::{CancelToken, CommandClient, FileInfoRequest, GeneralRequest, RequestSender};
use crate::config::{BridgeConfig, ChannelOptions, SocketPaths};
use crate::error::Result;
use crate::hooks::{HookChannel, HookHandler, HookRegistry};
use crate::lifecycle::{Lifecycle, MainLoopHandle};
use crate::protocol::ArgumentMap;

pub const INIT_COMMAND: &str = "icon_overlay_init";
pub const X_SERVER_COMMAND: &str = "on_x_server";
pub const CONTEXT_ACTION_COMMAND: &str = "icon_overlay_context_action";

/// Both daemon channels behind one handle.
///
/// The command channel and the hook channel share one [`Lifecycle`], so
/// disconnect observers hear about either socket dropping. Connect and
/// attempt observers follow the command channel only.
pub struct DropboxClient {
    command: CommandClient,
    hooks: HookChannel,
    lifecycle: Arc<Lifecycle>,
}

impl DropboxClient {
    pub fn new(config: &BridgeConfig, main_loop: MainLoopHandle) -> Self {
        Self::with_paths(
            config.socket_paths(),
            config.channel_options(),
            config.announce_on_connect,
            main_loop,
        )
    }

    pub fn with_paths(
        paths: SocketPaths,
        options: ChannelOptions,
        announce: bool,
        main_loop: MainLoopHandle,
    ) -> Self {
        let lifecycle = Arc::new(Lifecycle::new(main_loop.clone()));
        let command = CommandClient::new(paths.command, options, lifecycle.clone(), main_loop.clone());
        let hooks = HookChannel::new(
            paths.hooks,
            options,
            Arc::new(HookRegistry::new()),
            lifecycle.clone(),
            main_loop,
        );

        if announce {
            let sender = command.sender();
            lifecycle.add_on_connect(move || announce_to(&sender));
        }

        Self {
            command,
            hooks,
            lifecycle,
        }
    }

    /// Start the command worker thread and the hook reader task. Must be
    /// called from inside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.command.start()?;
        self.hooks.start()
    }

    /// Stop both channels. Queued requests are failed.
    pub fn shutdown(&self) {
        self.command.shutdown();
        self.hooks.shutdown();
    }

    pub fn send_command<F>(&self, command: &str, args: ArgumentMap, handler: F)
    where
        F: FnOnce(Option<ArgumentMap>) + Send + 'static,
    {
        self.command.send_command(command, args, handler);
    }

    pub fn send_simple_command(&self, command: &str) {
        self.command.send_simple_command(command);
    }

    pub fn request_file_info(&self, request: FileInfoRequest) -> CancelToken {
        self.command.request_file_info(request)
    }

    /// Run the context menu `verb` on `paths`.
    pub fn send_context_action<F>(&self, paths: &[PathBuf], verb: &str, handler: F)
    where
        F: FnOnce(Option<ArgumentMap>) + Send + 'static,
    {
        self.command.request(context_action(paths, verb).on_complete(handler));
    }

    pub fn is_connected(&self) -> bool {
        self.command.is_connected()
    }

    pub fn force_reconnect(&self) {
        self.command.force_reconnect();
    }

    pub fn add_on_connect<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.lifecycle.add_on_connect(hook);
    }

    pub fn add_on_disconnect<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.lifecycle.add_on_disconnect(hook);
    }

    pub fn add_on_connection_attempt<F>(&self, hook: F)
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.lifecycle.add_on_connection_attempt(hook);
    }

    /// Register a handler for the named hook event.
    pub fn add_hook<H>(&self, event: &str, handler: H)
    where
        H: HookHandler + 'static,
    {
        self.hooks.registry().register(event, handler);
    }

    pub fn command(&self) -> &CommandClient {
        &self.command
    }

    pub fn hooks(&self) -> &HookChannel {
        &self.hooks
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    pub fn sender(&self) -> RequestSender {
        self.command.sender()
    }
}

fn context_action(paths: &[PathBuf], verb: &str) -> GeneralRequest {
    let mut request = GeneralRequest::new(CONTEXT_ACTION_COMMAND);
    for path in paths {
        request = request.arg("paths", path.to_string_lossy());
    }
    request.arg("verb", verb)
}

/// Tell a freshly connected daemon we are here and which X display to use.
fn announce_to(sender: &RequestSender) {
    sender.send_simple_command(INIT_COMMAND);
    match std::env::var("DISPLAY") {
        Ok(display) if !display.is_empty() => {
            sender.request(GeneralRequest::new(X_SERVER_COMMAND).arg("display", display));
        }
        _ => tracing::debug!("DISPLAY not set, skipping {}", X_SERVER_COMMAND),
    }
}
