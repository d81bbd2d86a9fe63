// ! Per-client MCP session
// !
// ! One session exists per connected client: one per SSE stream, exactly one
// ! for the stdio transport. The session owns the JSON-RPC method routing and
// ! delegates tool work to the dispatcher; the tool list is recomputed on
// ! every request rather than cached.

use crate::dispatch::ToolDispatcher;
use crate::plugin::PluginManager;
use crate::protocol::methods;
use crate::protocol::types::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcError, JsonRpcMessage,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, LATEST_PROTOCOL_VERSION,
    ListToolsResult, ServerCapabilities, ServerInfo, Tool, ToolsCapability, error_codes,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// An MCP-level connection with its own server handle
pub struct McpSession {
    client_id: String,
    server_info: ServerInfo,
    dispatcher: Arc<ToolDispatcher>,
    manager: Arc<PluginManager>,
    initialized: AtomicBool,
}

impl McpSession {
    pub fn new(
        client_id: impl Into<String>,
        dispatcher: Arc<ToolDispatcher>,
        manager: Arc<PluginManager>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            server_info: ServerInfo::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            dispatcher,
            manager,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Whether the peer completed the initialization handshake
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// The notification announcing a changed tool list
    pub fn list_changed_notification() -> JsonRpcNotification {
        JsonRpcNotification::new(methods::TOOLS_LIST_CHANGED, None)
    }

    /// Handle one inbound message; `None` means nothing goes back
    pub async fn handle_message(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification);
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_) => {
                debug!(client = %self.client_id, "ignoring unexpected response frame");
                None
            }
        }
    }

    fn handle_notification(&self, notification: JsonRpcNotification) {
        if notification.method == methods::INITIALIZED {
            self.initialized.store(true, Ordering::SeqCst);
            trace!(client = %self.client_id, "client initialized");
        } else {
            debug!(
                client = %self.client_id,
                method = %notification.method,
                "ignoring notification"
            );
        }
    }

    /// Route one JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        trace!(client = %self.client_id, method = %request.method, "request");
        let id = request.id.clone();

        let result = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request.params),
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => Ok(self.handle_tools_list().await),
            methods::TOOLS_CALL => self.handle_tools_call(request.params).await,
            other => {
                return JsonRpcMessage::Error(JsonRpcError::new(
                    id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {other}"),
                ));
            }
        };

        match result {
            Ok(value) => JsonRpcMessage::Response(JsonRpcResponse::success(id, value)),
            Err(error) => JsonRpcMessage::Error(JsonRpcError::new(
                id,
                error_codes::INVALID_PARAMS,
                error,
            )),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> Result<Value, String> {
        let params: InitializeParams = match params {
            Some(value) => serde_json::from_value(value)
                .map_err(|err| format!("invalid initialize params: {err}"))?,
            None => return Err("missing initialize params".to_string()),
        };
        debug!(
            client = %self.client_id,
            peer = %params.client_info.name,
            version = %params.protocol_version,
            "initialize"
        );

        let result = InitializeResult {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(true),
                }),
                experimental: None,
            },
            server_info: self.server_info.clone(),
            instructions: None,
        };
        serde_json::to_value(result).map_err(|err| err.to_string())
    }

    async fn handle_tools_list(&self) -> Value {
        let tools: Vec<Tool> = self
            .manager
            .get_tools()
            .await
            .into_iter()
            .map(|registered| Tool {
                name: registered.qualified_name,
                description: Some(registered.spec.description),
                input_schema: registered.spec.input_schema,
            })
            .collect();

        serde_json::to_value(ListToolsResult {
            tools,
            next_cursor: None,
        })
        .unwrap_or_else(|_| json!({"tools": []}))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, String> {
        let params: CallToolParams = match params {
            Some(value) => serde_json::from_value(value)
                .map_err(|err| format!("invalid tools/call params: {err}"))?,
            None => return Err("missing tools/call params".to_string()),
        };

        let result = self
            .dispatcher
            .call_tool(&self.client_id, &params.name, params.arguments)
            .await;
        serde_json::to_value(result).map_err(|err| err.to_string())
    }
}
