use parking_lot::RwLock;
use std::sync::Arc;

use crate::protocol::{dispatch_script_for_json, ViewEvent};

/// Endpoint that delivers serialized events into the embedded view.
///
/// Implement this for your UI toolkit's message-passing primitive. `post`
/// receives one complete JSON document per event and must not block for long.
pub trait ViewSink: Send + Sync + 'static {
    fn post(&self, message: &str);
}

impl<F> ViewSink for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn post(&self, message: &str) {
        self(message)
    }
}

/// Adapter for views that can only be reached by evaluating a script.
pub struct ScriptSink<F> {
    evaluate: F,
}

impl<F> ScriptSink<F>
where
    F: Fn(String) + Send + Sync + 'static,
{
    pub fn new(evaluate: F) -> Self {
        ScriptSink { evaluate }
    }
}

impl<F> ViewSink for ScriptSink<F>
where
    F: Fn(String) + Send + Sync + 'static,
{
    fn post(&self, message: &str) {
        (self.evaluate)(dispatch_script_for_json(message));
    }
}

/// Outbound half of the host/view bridge.
///
/// Delivery is fire-and-forget. With no view attached, `send` does nothing.
/// Attaching a new view swaps the target; a send that already picked up the
/// previous target still completes against it, and nothing is replayed to
/// the new one.
#[derive(Default)]
pub struct BridgeChannel {
    target: RwLock<Option<Arc<dyn ViewSink>>>,
}

impl BridgeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, sink: Arc<dyn ViewSink>) {
        let previous = self.target.write().replace(sink);
        if previous.is_some() {
            log::info!("Replaced attached view");
        } else {
            log::info!("View attached");
        }
    }

    /// Drop the current view. Returns whether one was attached.
    pub fn detach(&self) -> bool {
        let attached = self.target.write().take().is_some();
        if attached {
            log::info!("View detached");
        }
        attached
    }

    pub fn send(&self, event: &ViewEvent) {
        let target = self.target.read().clone();
        let Some(target) = target else {
            log::trace!("No view attached, dropping {}", event.name());
            return;
        };
        match event.to_json() {
            Ok(json) => target.post(&json),
            Err(e) => log::error!("{}", e),
        }
    }
}
