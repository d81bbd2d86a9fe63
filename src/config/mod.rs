//! Hub configuration
//!
//! The runtime consumes one normalized shape: an `mcp` block with the SSE
//! port and a dictionary of plugin entries keyed by registration name. The
//! registration name is the config key, which is what lets the same package
//! (notably the proxy) load several times under different names. The legacy
//! list-of-strings plugin form is rejected outright.

use crate::core::error::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default port of the SSE transport
pub const DEFAULT_PORT: u16 = 3000;

/// Per-user state directory (`~/.mcp-cli`)
pub fn state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-cli")
}

/// Default location of the config file
pub fn config_path() -> PathBuf {
    state_dir().join("config.json")
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HubConfig {
    #[serde(default)]
    pub mcp: McpSettings,
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginEntry>,
}

/// MCP transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpSettings {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// One plugin to load at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginEntry {
    /// Module specifier resolved against the module registry
    pub package: String,
    /// Plugin-specific options, passed through opaquely
    #[serde(default = "default_plugin_config")]
    pub config: Value,
    /// Local tool names masked at load time
    #[serde(default, rename = "disabledTools")]
    pub disabled_tools: Vec<String>,
}

fn default_plugin_config() -> Value {
    Value::Object(serde_json::Map::new())
}

impl HubConfig {
    /// Parse and normalize config text
    pub fn parse(text: &str) -> HubResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| HubError::config(format!("invalid config JSON: {err}")))?;

        if value.get("plugins").is_some_and(Value::is_array) {
            return Err(HubError::config(
                "legacy plugin list is not supported; use \
                 {\"plugins\": {\"<name>\": {\"package\": \"...\"}}}",
            ));
        }

        serde_json::from_value(value)
            .map_err(|err| HubError::config(format!("invalid config shape: {err}")))
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load(path: &Path) -> HubResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(HubError::config(format!(
                "cannot read {}: {err}",
                path.display()
            ))),
        }
    }
}
