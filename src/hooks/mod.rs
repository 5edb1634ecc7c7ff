pub mod channel;
pub mod parser;

pub use channel::HookChannel;
pub use parser::{HookParser, ParsePhase};

use std::sync::Arc;

use dashmap::DashMap;

use crate::protocol::ArgumentMap;

/// Events the daemon is known to push.
pub const KNOWN_EVENTS: &[&str] = &[
    "shell_touch",
    "copy_to_clipboard",
    "launch_folder",
    "launch_url",
    "dropbox_quit",
];

/// One push notification from the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookEvent {
    pub name: String,
    pub args: ArgumentMap,
}

/// A handler for one named hook event.
pub trait HookHandler: Send + Sync {
    /// Argument keys the handler cannot work without. Events missing any of
    /// them are not delivered to this handler.
    fn required_args(&self) -> &[&'static str] {
        &[]
    }

    fn handle(&self, args: &ArgumentMap);
}

impl<F> HookHandler for F
where
    F: Fn(&ArgumentMap) + Send + Sync,
{
    fn handle(&self, args: &ArgumentMap) {
        self(args)
    }
}

/// Wraps a closure with a list of required argument keys.
pub struct Requires<F> {
    keys: &'static [&'static str],
    handler: F,
}

/// `requires(&["path"], |args| ...)` only sees events carrying `path`.
pub fn requires<F>(keys: &'static [&'static str], handler: F) -> Requires<F>
where
    F: Fn(&ArgumentMap) + Send + Sync,
{
    Requires { keys, handler }
}

impl<F> HookHandler for Requires<F>
where
    F: Fn(&ArgumentMap) + Send + Sync,
{
    fn required_args(&self) -> &[&'static str] {
        self.keys
    }

    fn handle(&self, args: &ArgumentMap) {
        (self.handler)(args)
    }
}

/// Event name → handlers, in registration order.
#[derive(Default)]
pub struct HookRegistry {
    handlers: DashMap<String, Vec<Arc<dyn HookHandler>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&self, event: &str, handler: H)
    where
        H: HookHandler + 'static,
    {
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map(|h| h.len()).unwrap_or(0)
    }

    /// Invoke every handler registered for `event.name`. Unknown events are
    /// ignored. Returns how many handlers ran.
    pub fn dispatch(&self, event: &HookEvent) -> usize {
        // Clone the list so handlers may register further hooks.
        let handlers = match self.handlers.get(&event.name) {
            Some(handlers) => handlers.value().clone(),
            None => {
                tracing::trace!(event = %event.name, "no handler for hook");
                return 0;
            }
        };

        let mut ran = 0;
        for handler in handlers {
            let missing: Vec<_> = handler
                .required_args()
                .iter()
                .filter(|key| !event.args.contains_key(key))
                .collect();
            if !missing.is_empty() {
                tracing::warn!(event = %event.name, ?missing, "hook event missing required arguments");
                continue;
            }
            handler.handle(&event.args);
            ran += 1;
        }
        ran
    }
}
