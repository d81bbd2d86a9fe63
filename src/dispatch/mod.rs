//! Tool-call dispatcher
//!
//! Single choke point for every tool invocation, local or remote. Resolves
//! the fully-qualified name against the currently visible tools, validates
//! arguments centrally, runs the handler, and records exactly one telemetry
//! entry per call after the handler completes (so the duration covers only
//! the handler). Handler failures become `isError` responses; a tool call
//! never takes the process down.

use crate::plugin::PluginManager;
use crate::protocol::types::CallToolResult;
use crate::protocol::validation::validate_arguments;
use crate::telemetry::{TelemetryStore, ToolCallLog};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Client identity of locally-issued `call` verbs
pub const CLIENT_CLI: &str = "cli";
/// Client identity of the process-stdio transport
pub const CLIENT_STDIO: &str = "stdio";

/// Routes tool calls from every surface to plugin handlers
pub struct ToolDispatcher {
    manager: Arc<PluginManager>,
    telemetry: Arc<TelemetryStore>,
}

impl ToolDispatcher {
    pub fn new(manager: Arc<PluginManager>, telemetry: Arc<TelemetryStore>) -> Self {
        Self { manager, telemetry }
    }

    /// Invoke a tool by its fully-qualified name
    pub async fn call_tool(
        &self,
        client_id: &str,
        tool_name: &str,
        arguments: Option<HashMap<String, Value>>,
    ) -> CallToolResult {
        let args: Map<String, Value> = arguments.unwrap_or_default().into_iter().collect();
        let params = Value::Object(args.clone());
        let request_bytes = serialized_len(&params);

        let tools = self.manager.get_tools().await;
        let Some(tool) = tools.into_iter().find(|t| t.qualified_name == tool_name) else {
            let message = format!("Unknown tool: {tool_name}");
            debug!(client = client_id, tool = tool_name, "unknown tool");
            self.telemetry.record(ToolCallLog {
                timestamp: Utc::now(),
                client_id: client_id.to_string(),
                tool: tool_name.to_string(),
                params,
                success: false,
                error: Some(message.clone()),
                duration_ms: 0,
                request_bytes,
                response_bytes: message.len() as u64,
            });
            return CallToolResult::error_text(message);
        };

        let start = Instant::now();

        let outcome = match validate_arguments(&tool.spec.input_schema, &args) {
            Ok(()) => tool.spec.handler.call(params.clone()).await,
            Err(err) => Err(err),
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                let text = stringify_result(value);
                self.telemetry.record(ToolCallLog {
                    timestamp: Utc::now(),
                    client_id: client_id.to_string(),
                    tool: tool_name.to_string(),
                    params,
                    success: true,
                    error: None,
                    duration_ms,
                    request_bytes,
                    response_bytes: text.len() as u64,
                });
                CallToolResult::text(text)
            }
            Err(err) => {
                let message = err.to_string();
                let text = format!("Error: {message}");
                self.telemetry.record(ToolCallLog {
                    timestamp: Utc::now(),
                    client_id: client_id.to_string(),
                    tool: tool_name.to_string(),
                    params,
                    success: false,
                    error: Some(message),
                    duration_ms,
                    request_bytes,
                    response_bytes: text.len() as u64,
                });
                CallToolResult::error_text(text)
            }
        }
    }
}

/// UTF-8 length of a value's compact JSON form
fn serialized_len(value: &Value) -> u64 {
    serde_json::to_string(value)
        .map(|s| s.len() as u64)
        .unwrap_or(0)
}

/// Strings pass through verbatim; everything else is pretty-printed JSON
fn stringify_result(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}
