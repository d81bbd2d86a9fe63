// ! Proxy plugin
// !
// ! A factory plugin: the manager constructs one fresh instance per
// ! registered name, and each instance owns one child MCP client. Tools
// ! discovered from the child at connect time are re-exported through the
// ! instance's exports, so they surface under `<regName>_<childTool>` like
// ! any native tool and disappear again when the child goes away.

use crate::core::error::{HubError, HubResult};
use crate::plugin::api::{
    ArgSpec, CommandOutput, CommandSpec, FnCommand, FnTool, HelpEntry, Plugin, PluginExport,
    PluginHelp, PluginManifest, PluginStatus,
};
use crate::plugin::context::PluginContext;
use crate::proxy::client::ProxyClient;
use crate::proxy::transport::{
    ChildTransport, ExitCallback, SseChildTransport, StdioChildTransport,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::debug;

/// Per-instance proxy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Command to spawn for a stdio child
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Extra environment merged over the parent's for a stdio child
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// SSE URL of a remote child
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Connect during init instead of waiting for the `connect` verb
    #[serde(default)]
    pub auto_connect: bool,
}

impl ProxyConfig {
    /// Exactly one of `command` / `url` must be present
    pub fn validate(&self) -> HubResult<()> {
        match (&self.command, &self.url) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(HubError::config(
                "proxy config must set either 'command' or 'url', not both",
            )),
            (None, None) => Err(HubError::config(
                "proxy config needs a 'command' or a 'url'",
            )),
        }
    }

    fn from_value(value: &Value) -> HubResult<Self> {
        let config: Self = serde_json::from_value(value.clone())
            .map_err(|err| HubError::config(format!("bad proxy config: {err}")))?;
        config.validate()?;
        Ok(config)
    }
}

/// Tool metadata discovered from the child
#[derive(Debug, Clone)]
struct ChildTool {
    name: String,
    description: String,
    input_schema: Value,
}

/// Connection state readable from the sync plugin surface
#[derive(Default)]
struct ProxySnapshot {
    connected: bool,
    last_error: Option<String>,
    tools: Vec<ChildTool>,
}

struct ProxyShared {
    config: StdMutex<Option<ProxyConfig>>,
    context: StdMutex<Option<PluginContext>>,
    /// The live child client; the lock also serializes connect/disconnect
    client: Mutex<Option<Arc<ProxyClient>>>,
    snapshot: StdMutex<ProxySnapshot>,
    stderr_tail: Arc<StdMutex<VecDeque<String>>>,
}

impl ProxyShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            config: StdMutex::new(None),
            context: StdMutex::new(None),
            client: Mutex::new(None),
            snapshot: StdMutex::new(ProxySnapshot::default()),
            stderr_tail: Arc::new(StdMutex::new(VecDeque::new())),
        })
    }

    fn config(&self) -> HubResult<ProxyConfig> {
        self.config
            .lock()
            .expect("config lock poisoned")
            .clone()
            .ok_or_else(|| HubError::plugin("proxy is not initialized"))
    }

    fn log(&self, message: &str) {
        if let Some(context) = self.context.lock().expect("context lock poisoned").as_ref() {
            context.log(message);
        }
    }

    fn notify_state_change(&self) {
        if let Some(context) = self.context.lock().expect("context lock poisoned").as_ref() {
            context.notify_state_change();
        }
    }

    fn set_error(&self, message: impl Into<String>) {
        self.snapshot.lock().expect("snapshot lock poisoned").last_error = Some(message.into());
    }

    /// Establish the child transport, handshake, and discover tools
    async fn connect(self: &Arc<Self>) -> HubResult<String> {
        let config = self.config()?;
        let mut client_guard = self.client.lock().await;
        if client_guard.is_some() {
            return Err(HubError::plugin("already connected"));
        }

        let weak = Arc::downgrade(self);
        let on_exit: ExitCallback = Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.handle_child_exit();
            }
        });

        let transport: Box<dyn ChildTransport> = match (&config.command, &config.url) {
            (Some(command), _) => Box::new(
                StdioChildTransport::spawn(
                    command,
                    &config.args,
                    &config.env,
                    self.stderr_tail.clone(),
                    on_exit,
                )
                .await
                .inspect_err(|err| self.set_error(err.to_string()))?,
            ),
            (None, Some(url)) => Box::new(
                SseChildTransport::connect(url, on_exit)
                    .await
                    .inspect_err(|err| self.set_error(err.to_string()))?,
            ),
            (None, None) => {
                return Err(HubError::config("proxy config needs a 'command' or a 'url'"));
            }
        };

        let client = Arc::new(ProxyClient::new(transport));

        let tools = match handshake(&client).await {
            Ok(tools) => tools,
            Err(err) => {
                client.close().await;
                self.set_error(err.to_string());
                return Err(err);
            }
        };

        let summary = format!("connected ({} tools)", tools.len());
        {
            let mut snapshot = self.snapshot.lock().expect("snapshot lock poisoned");
            snapshot.connected = true;
            snapshot.last_error = None;
            snapshot.tools = tools;
        }
        *client_guard = Some(client);
        drop(client_guard);

        self.log(&summary);
        self.notify_state_change();
        Ok(summary)
    }

    /// Tear the connection down; safe to call when not connected
    async fn disconnect(&self) -> bool {
        let client = self.client.lock().await.take();
        let Some(client) = client else {
            return false;
        };
        client.close().await;

        {
            let mut snapshot = self.snapshot.lock().expect("snapshot lock poisoned");
            snapshot.connected = false;
            snapshot.tools.clear();
        }
        self.log("disconnected");
        self.notify_state_change();
        true
    }

    /// Reader-task callback: the child went away on its own
    fn handle_child_exit(self: Arc<Self>) {
        {
            let mut snapshot = self.snapshot.lock().expect("snapshot lock poisoned");
            snapshot.connected = false;
            snapshot.tools.clear();
            snapshot.last_error = Some("child exited".to_string());
        }
        self.log("child exited");
        self.notify_state_change();

        let shared = self.clone();
        tokio::spawn(async move {
            let mut client = shared.client.lock().await;
            // A reconnect may have raced this cleanup; only drop a dead client
            let connected = shared
                .snapshot
                .lock()
                .expect("snapshot lock poisoned")
                .connected;
            if !connected {
                client.take();
            }
        });
    }

    /// Forward a tool call to the child and unwrap the first text content
    async fn call_child_tool(&self, tool: &str, params: Value) -> HubResult<Value> {
        let client = self
            .client
            .lock()
            .await
            .clone()
            .ok_or_else(|| HubError::plugin("not connected"))?;

        let result = client.call_tool(tool, params).await?;

        let text = result
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| {
                blocks.iter().find_map(|block| {
                    (block.get("type").and_then(Value::as_str) == Some("text"))
                        .then(|| block.get("text").and_then(Value::as_str))
                        .flatten()
                })
            })
            .unwrap_or_default()
            .to_string();

        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            return Err(HubError::plugin(text));
        }
        Ok(Value::String(text))
    }

    fn status(&self) -> PluginStatus {
        let snapshot = self.snapshot.lock().expect("snapshot lock poisoned");
        if snapshot.connected {
            PluginStatus::green(format!("{} tools", snapshot.tools.len()))
        } else if snapshot.last_error.is_some() {
            PluginStatus::red("error")
        } else {
            PluginStatus::gray("disconnected")
        }
    }

    fn status_line(&self) -> String {
        let snapshot = self.snapshot.lock().expect("snapshot lock poisoned");
        if snapshot.connected {
            format!("connected ({} tools)", snapshot.tools.len())
        } else {
            match &snapshot.last_error {
                Some(error) => format!("disconnected: {error}"),
                None => "disconnected".to_string(),
            }
        }
    }

    fn debug_dump(&self) -> String {
        let config = self
            .config
            .lock()
            .expect("config lock poisoned")
            .as_ref()
            .and_then(|config| serde_json::to_string_pretty(config).ok())
            .unwrap_or_else(|| "(not initialized)".to_string());
        let snapshot = self.snapshot.lock().expect("snapshot lock poisoned");
        let stderr_tail = self.stderr_tail.lock().expect("stderr tail lock poisoned");

        let mut dump = format!("config:\n{config}\n");
        dump.push_str(&format!("connected: {}\n", snapshot.connected));
        dump.push_str(&format!(
            "last error: {}\n",
            snapshot.last_error.as_deref().unwrap_or("(none)")
        ));
        if stderr_tail.is_empty() {
            dump.push_str("child stderr: (empty)");
        } else {
            dump.push_str("child stderr:\n");
            for line in stderr_tail.iter() {
                dump.push_str("  ");
                dump.push_str(line);
                dump.push('\n');
            }
        }
        dump
    }
}

async fn handshake(client: &Arc<ProxyClient>) -> HubResult<Vec<ChildTool>> {
    client.initialize().await?;
    let tools = client.list_tools().await?;
    debug!(count = tools.len(), "discovered child tools");
    Ok(tools
        .into_iter()
        .map(|tool| ChildTool {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            input_schema: tool.input_schema,
        })
        .collect())
}

/// Plugin hosting one child MCP server
pub struct ProxyPlugin {
    shared: Arc<ProxyShared>,
}

impl ProxyPlugin {
    pub fn new() -> Self {
        Self {
            shared: ProxyShared::new(),
        }
    }
}

impl Default for ProxyPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for ProxyPlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest::new(
            "mcp-proxy",
            env!("CARGO_PKG_VERSION"),
            "Re-exports tools discovered from an external MCP server",
        )
    }

    async fn init(&mut self, context: PluginContext) -> HubResult<()> {
        let config = ProxyConfig::from_value(context.config())?;
        let auto_connect = config.auto_connect;
        *self.shared.config.lock().expect("config lock poisoned") = Some(config);
        *self.shared.context.lock().expect("context lock poisoned") = Some(context.clone());

        if auto_connect {
            // Auto-connect failures never fail the load
            if let Err(err) = self.shared.connect().await {
                self.shared.set_error(err.to_string());
                context.log(&format!("auto-connect failed: {err}"));
            }
        }
        Ok(())
    }

    async fn destroy(&mut self) -> HubResult<()> {
        self.shared.disconnect().await;
        Ok(())
    }

    fn exports(&self) -> Vec<PluginExport> {
        let mut exports = proxy_commands(&self.shared);

        let tools: Vec<ChildTool> = {
            let snapshot = self.shared.snapshot.lock().expect("snapshot lock poisoned");
            if snapshot.connected {
                snapshot.tools.clone()
            } else {
                Vec::new()
            }
        };

        for tool in tools {
            let shared = self.shared.clone();
            let tool_name = tool.name.clone();
            exports.push(PluginExport::Tool(crate::plugin::api::ToolSpec::new(
                tool.name,
                tool.description,
                tool.input_schema,
                FnTool(move |params: Value| {
                    let shared = shared.clone();
                    let tool_name = tool_name.clone();
                    async move { shared.call_child_tool(&tool_name, params).await }
                }),
            )));
        }
        exports
    }

    fn status(&self) -> PluginStatus {
        self.shared.status()
    }

    fn help(&self) -> PluginHelp {
        PluginHelp {
            summary: "Hosts an external MCP server as a child and re-exports its tools \
                      under this plugin's name."
                .to_string(),
            commands: vec![
                HelpEntry::new("connect", "Spawn or dial the child and discover its tools"),
                HelpEntry::new("disconnect", "Close the child connection"),
                HelpEntry::new("restart", "Disconnect, then connect again"),
                HelpEntry::new("status", "Show the connection state"),
                HelpEntry::new("debug", "Dump config, last error, and child stderr"),
            ],
            tools: vec![HelpEntry::new(
                "<discovered>",
                "One tool per child tool, available while connected",
            )],
        }
    }
}

fn proxy_commands(shared: &Arc<ProxyShared>) -> Vec<PluginExport> {
    let connect = {
        let shared = shared.clone();
        CommandSpec::new(
            "connect",
            "Spawn or dial the configured MCP server",
            FnCommand(move |_args: Vec<String>| {
                let shared = shared.clone();
                async move { shared.connect().await.map(CommandOutput::ok) }
            }),
        )
    };

    let disconnect = {
        let shared = shared.clone();
        CommandSpec::new(
            "disconnect",
            "Close the child connection",
            FnCommand(move |_args: Vec<String>| {
                let shared = shared.clone();
                async move {
                    let message = if shared.disconnect().await {
                        "disconnected"
                    } else {
                        "not connected"
                    };
                    Ok(CommandOutput::ok(message))
                }
            }),
        )
    };

    let restart = {
        let shared = shared.clone();
        CommandSpec::new(
            "restart",
            "Disconnect, then connect again",
            FnCommand(move |_args: Vec<String>| {
                let shared = shared.clone();
                async move {
                    shared.disconnect().await;
                    shared.connect().await.map(CommandOutput::ok)
                }
            }),
        )
    };

    let status = {
        let shared = shared.clone();
        CommandSpec::new(
            "status",
            "Show the connection state",
            FnCommand(move |_args: Vec<String>| {
                let shared = shared.clone();
                async move { Ok(CommandOutput::ok(shared.status_line())) }
            }),
        )
    };

    let debug = {
        let shared = shared.clone();
        CommandSpec::new(
            "debug",
            "Dump config, last error, and recent child stderr",
            FnCommand(move |_args: Vec<String>| {
                let shared = shared.clone();
                async move { Ok(CommandOutput::ok(shared.debug_dump())) }
            }),
        )
        .with_args(vec![ArgSpec::optional("section")])
    };

    vec![
        PluginExport::Command(connect),
        PluginExport::Command(disconnect),
        PluginExport::Command(restart),
        PluginExport::Command(status),
        PluginExport::Command(debug),
    ]
}
