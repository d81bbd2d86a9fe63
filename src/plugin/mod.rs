//! Plugin system
//!
//! Plugins are independently-authored modules that contribute CLI verbs and
//! MCP tools. The manager owns their lifecycle; consumers (dispatcher,
//! command registry, MCP sessions) only ever see aggregated snapshots.

pub mod api;
pub mod context;
pub mod manager;
pub mod registry;

pub use api::{
    ArgSpec, CommandHandler, CommandOutput, CommandSpec, FnCommand, FnTool, HelpEntry, Plugin,
    PluginConstructor, PluginExport, PluginHelp, PluginManifest, PluginStatus, StatusIndicator,
    ToolHandler, ToolSpec,
};
pub use context::PluginContext;
pub use manager::{PluginManager, PluginSummary, RegisteredCommand, RegisteredTool};
pub use registry::ModuleRegistry;

/// Plugin lifecycle events published by the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    /// Plugin finished loading
    Loaded { plugin: String },
    /// Plugin was destroyed and removed
    Unloaded { plugin: String },
    /// Plugin transitioned to enabled
    Enabled { plugin: String },
    /// Plugin transitioned to disabled
    Disabled { plugin: String },
    /// A plugin's exports or tool mask changed
    StateChange { plugin: String },
}

impl PluginEvent {
    /// Registration name the event concerns
    pub fn plugin(&self) -> &str {
        match self {
            PluginEvent::Loaded { plugin }
            | PluginEvent::Unloaded { plugin }
            | PluginEvent::Enabled { plugin }
            | PluginEvent::Disabled { plugin }
            | PluginEvent::StateChange { plugin } => plugin,
        }
    }

    /// Whether live MCP sessions should announce a changed tool list
    pub fn changes_tool_visibility(&self) -> bool {
        matches!(
            self,
            PluginEvent::Enabled { .. }
                | PluginEvent::Disabled { .. }
                | PluginEvent::StateChange { .. }
        )
    }
}
