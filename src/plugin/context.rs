//! Per-instance runtime context handed to plugins at init

use crate::plugin::PluginEvent;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::info;

/// Runtime services a plugin may use for its whole lifetime
///
/// The context is cheap to clone; plugins typically keep one inside their
/// shared state. `log` writes to the diagnostic side channel (stderr via
/// `tracing`) and never touches an MCP protocol stream.
#[derive(Clone)]
pub struct PluginContext {
    name: String,
    config: Value,
    events: broadcast::Sender<PluginEvent>,
}

impl PluginContext {
    pub(crate) fn new(name: String, config: Value, events: broadcast::Sender<PluginEvent>) -> Self {
        Self {
            name,
            config,
            events,
        }
    }

    /// The registration name this instance was loaded under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Immutable view of the per-plugin configuration
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Announce that this plugin's exports changed
    ///
    /// Re-emits a state-change event upstream, which fans out
    /// `notifications/tools/list_changed` to every live MCP session.
    pub fn notify_state_change(&self) {
        let _ = self.events.send(PluginEvent::StateChange {
            plugin: self.name.clone(),
        });
    }

    /// Write a prefixed diagnostic line
    pub fn log(&self, message: &str) {
        info!(plugin = %self.name, "{message}");
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
