//! Shared fixtures: a configurable in-crate plugin exercising the contract
#![allow(dead_code)]

use async_trait::async_trait;
use mcp_hub::core::error::{HubError, HubResult};
use mcp_hub::plugin::{
    ArgSpec, CommandOutput, CommandSpec, FnCommand, FnTool, HelpEntry, Plugin, PluginContext,
    PluginExport, PluginHelp, PluginManifest, PluginStatus, ToolSpec,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

/// Records lifecycle hook invocations for assertions
pub type HookLog = Arc<Mutex<Vec<String>>>;

pub fn new_hook_log() -> HookLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn hook_entries(log: &HookLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// A plugin assembled piecewise by the tests
pub struct FixturePlugin {
    name: String,
    exports: Vec<PluginExport>,
    fail_init: Option<String>,
    hooks: Option<HookLog>,
    context: Option<PluginContext>,
}

impl FixturePlugin {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            exports: Vec::new(),
            fail_init: None,
            hooks: None,
            context: None,
        }
    }

    /// Record init/destroy/enable/disable calls into the given log
    pub fn with_hooks(mut self, hooks: HookLog) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// `echo` tool: returns the `message` argument verbatim
    pub fn with_echo_tool(mut self) -> Self {
        self.exports.push(PluginExport::Tool(ToolSpec::new(
            "echo",
            "Echo a message",
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            }),
            FnTool(|params: Value| async move {
                Ok(params
                    .get("message")
                    .cloned()
                    .unwrap_or_else(|| Value::String(String::new())))
            }),
        )));
        self
    }

    /// `inspect` tool: returns a JSON object (exercises stringification)
    pub fn with_inspect_tool(mut self) -> Self {
        self.exports.push(PluginExport::Tool(ToolSpec::new(
            "inspect",
            "Return the received arguments as an object",
            json!({"type": "object", "properties": {}}),
            FnTool(|params: Value| async move { Ok(json!({"received": params})) }),
        )));
        self
    }

    /// `boom` tool: always fails
    pub fn with_failing_tool(mut self) -> Self {
        self.exports.push(PluginExport::Tool(ToolSpec::new(
            "boom",
            "Always fails",
            json!({"type": "object", "properties": {}}),
            FnTool(|_params: Value| async move {
                Err::<Value, _>(HubError::plugin("the handler exploded"))
            }),
        )));
        self
    }

    /// Extra tool with an arbitrary local name, echoing its own name
    pub fn with_named_tool(mut self, name: &str) -> Self {
        let reply = name.to_string();
        self.exports.push(PluginExport::Tool(ToolSpec::new(
            name,
            "Named tool",
            json!({"type": "object", "properties": {}}),
            FnTool(move |_params: Value| {
                let reply = reply.clone();
                async move { Ok(Value::String(reply)) }
            }),
        )));
        self
    }

    /// Duplicate local tool names; the manager must reject this shape
    pub fn with_duplicate_tools(self) -> Self {
        self.with_named_tool("dup").with_named_tool("dup")
    }

    /// `status` verb: replies with the arguments it received, joined
    pub fn with_status_command(mut self) -> Self {
        self.exports.push(PluginExport::Command(
            CommandSpec::new(
                "status",
                "Report fixture status",
                FnCommand(|args: Vec<String>| async move {
                    Ok(CommandOutput::ok(args.join(" ")))
                }),
            )
            .with_args(vec![ArgSpec::optional("detail")]),
        ));
        self
    }

    /// A verb that always returns a handler error
    pub fn with_failing_command(mut self) -> Self {
        self.exports.push(PluginExport::Command(CommandSpec::new(
            "explode",
            "Always fails",
            FnCommand(|_args: Vec<String>| async move {
                Err::<CommandOutput, _>(HubError::plugin("command failed"))
            }),
        )));
        self
    }

    /// A verb shadowing the `help` built-in; the registry must refuse it
    pub fn with_shadowing_command(mut self) -> Self {
        self.exports.push(PluginExport::Command(CommandSpec::new(
            "help",
            "Tries to shadow a built-in",
            FnCommand(|_args: Vec<String>| async move { Ok(CommandOutput::ok("shadowed")) }),
        )));
        self
    }

    pub fn with_fail_init(mut self, message: &str) -> Self {
        self.fail_init = Some(message.to_string());
        self
    }

    fn record(&self, hook: &str) {
        if let Some(hooks) = &self.hooks {
            hooks.lock().unwrap().push(hook.to_string());
        }
    }
}

#[async_trait]
impl Plugin for FixturePlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest::new(self.name.as_str(), "1.2.3", "Test fixture plugin")
    }

    async fn init(&mut self, context: PluginContext) -> HubResult<()> {
        if let Some(message) = &self.fail_init {
            return Err(HubError::plugin(message.clone()));
        }
        self.record("init");
        self.context = Some(context);
        Ok(())
    }

    async fn destroy(&mut self) -> HubResult<()> {
        self.record("destroy");
        Ok(())
    }

    async fn on_enable(&mut self) -> HubResult<()> {
        self.record("enable");
        Ok(())
    }

    async fn on_disable(&mut self) -> HubResult<()> {
        self.record("disable");
        Ok(())
    }

    fn exports(&self) -> Vec<PluginExport> {
        self.exports.clone()
    }

    fn status(&self) -> PluginStatus {
        PluginStatus::green("ready")
    }

    fn help(&self) -> PluginHelp {
        PluginHelp {
            summary: "Fixture plugin used by the test suite".to_string(),
            commands: vec![HelpEntry::new("status", "Report fixture status")],
            tools: vec![HelpEntry::new("echo", "Echo a message")],
        }
    }
}
