// ! Plugin API definitions
// !
// ! Module defines the contract every plugin implements and the tagged
// ! export types (CLI verbs and tools) the runtime aggregates. CLI verbs and
// ! tools share nothing structurally, so exports are a tagged sum rather
// ! than duck-typed objects.

use crate::core::error::HubResult;
use crate::plugin::context::PluginContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Identity a plugin declares about itself
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginManifest {
    /// Unique name of the packaged plugin
    pub name: String,
    /// Semver version string
    pub version: String,
    /// Human-readable description
    pub description: String,
}

impl PluginManifest {
    pub fn new<S: Into<String>>(name: S, version: S, description: S) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

/// Traffic-light style health indicator shown in the status bar
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusIndicator {
    Green,
    Yellow,
    Red,
    Gray,
}

impl std::fmt::Display for StatusIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StatusIndicator::Green => "green",
            StatusIndicator::Yellow => "yellow",
            StatusIndicator::Red => "red",
            StatusIndicator::Gray => "gray",
        };
        f.write_str(label)
    }
}

/// Current plugin health
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginStatus {
    pub indicator: StatusIndicator,
    pub text: String,
}

impl PluginStatus {
    pub fn green(text: impl Into<String>) -> Self {
        Self {
            indicator: StatusIndicator::Green,
            text: text.into(),
        }
    }

    pub fn red(text: impl Into<String>) -> Self {
        Self {
            indicator: StatusIndicator::Red,
            text: text.into(),
        }
    }

    pub fn gray(text: impl Into<String>) -> Self {
        Self {
            indicator: StatusIndicator::Gray,
            text: text.into(),
        }
    }
}

/// Structured documentation returned by `help()`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PluginHelp {
    /// One-paragraph overview
    pub summary: String,
    /// Documented CLI verbs
    pub commands: Vec<HelpEntry>,
    /// Documented tools
    pub tools: Vec<HelpEntry>,
}

/// One documented export
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HelpEntry {
    pub name: String,
    pub description: String,
}

impl HelpEntry {
    pub fn new<S: Into<String>>(name: S, description: S) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Declared argument of a CLI verb
///
/// `choices` only feeds completion; the runtime never enforces them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl ArgSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            choices: Vec::new(),
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            choices: Vec::new(),
        }
    }
}

/// Outcome of running a CLI verb
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandOutput {
    pub output: String,
    pub success: bool,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    pub fn fail(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
        }
    }
}

/// Implementation of a CLI verb
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, args: Vec<String>) -> HubResult<CommandOutput>;
}

/// Implementation of a tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute with schema-validated parameters, returning any JSON value
    async fn call(&self, params: Value) -> HubResult<Value>;
}

/// Adapter turning an async closure into a [`CommandHandler`]
pub struct FnCommand<F>(pub F);

#[async_trait]
impl<F, Fut> CommandHandler for FnCommand<F>
where
    F: Fn(Vec<String>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = HubResult<CommandOutput>> + Send,
{
    async fn run(&self, args: Vec<String>) -> HubResult<CommandOutput> {
        (self.0)(args).await
    }
}

/// Adapter turning an async closure into a [`ToolHandler`]
pub struct FnTool<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = HubResult<Value>> + Send,
{
    async fn call(&self, params: Value) -> HubResult<Value> {
        (self.0)(params).await
    }
}

/// A CLI verb contributed by a plugin
#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub args: Vec<ArgSpec>,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandSpec {
    pub fn new<H>(name: impl Into<String>, description: impl Into<String>, handler: H) -> Self
    where
        H: CommandHandler + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            args: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn with_args(mut self, args: Vec<ArgSpec>) -> Self {
        self.args = args;
        self
    }
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// A tool contributed by a plugin
#[derive(Clone)]
pub struct ToolSpec {
    /// Local (unprefixed) name
    pub name: String,
    pub description: String,
    /// JSON Schema for the input object, carried opaquely
    pub input_schema: Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolSpec {
    pub fn new<H>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: H,
    ) -> Self
    where
        H: ToolHandler + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Arc::new(handler),
        }
    }
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

/// One named export of a plugin
#[derive(Debug, Clone)]
pub enum PluginExport {
    Command(CommandSpec),
    Tool(ToolSpec),
}

impl PluginExport {
    pub fn name(&self) -> &str {
        match self {
            PluginExport::Command(spec) => &spec.name,
            PluginExport::Tool(spec) => &spec.name,
        }
    }
}

/// Contract implemented by every plugin
///
/// Lifecycle: constructed by the module's constructor function, `init` once
/// with its context, then enabled/disabled any number of times, `destroy`
/// on unload. Exports are re-queried on demand so they may change over the
/// plugin's lifetime (the proxy grows tools when it connects).
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Identity of this plugin
    fn manifest(&self) -> PluginManifest;

    /// Initialize with the runtime context
    async fn init(&mut self, context: PluginContext) -> HubResult<()>;

    /// Release all resources before unload
    async fn destroy(&mut self) -> HubResult<()>;

    /// Hook invoked when the plugin transitions to enabled
    async fn on_enable(&mut self) -> HubResult<()> {
        Ok(())
    }

    /// Hook invoked when the plugin transitions to disabled
    async fn on_disable(&mut self) -> HubResult<()> {
        Ok(())
    }

    /// Current exports, keyed by their names
    fn exports(&self) -> Vec<PluginExport>;

    /// Current health
    fn status(&self) -> PluginStatus;

    /// Structured documentation
    fn help(&self) -> PluginHelp;
}

/// Constructor function exposed by a plugin module
///
/// Modules that support multiple instances return a fresh plugin per call;
/// single-instance modules may hand out the same state each time. Uniform at
/// the call site either way.
pub type PluginConstructor = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;
