// ! MCP client side of the proxy
// !
// ! Protocol-level operations (initialize handshake, tools/list, tools/call)
// ! on top of any child transport. Request ids are sequential numbers; the
// ! transport owns correlation and timeouts.

use crate::core::error::{HubError, HubResult};
use crate::protocol::methods;
use crate::protocol::types::{
    ClientCapabilities, Implementation, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, LATEST_PROTOCOL_VERSION, ListToolsResult, Tool,
};
use crate::proxy::transport::ChildTransport;
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// High-level client over one child MCP server
pub struct ProxyClient {
    transport: Box<dyn ChildTransport>,
    next_id: AtomicU64,
    server_info: Mutex<Option<Implementation>>,
}

impl ProxyClient {
    pub fn new(transport: Box<dyn ChildTransport>) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(0),
            server_info: Mutex::new(None),
        }
    }

    async fn request(&self, method: &str, params: Option<Value>) -> HubResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let request = JsonRpcRequest::new(json!(id), method, params);
        let response = self.transport.send_request(request).await?;
        Ok(response.result)
    }

    /// Perform the MCP handshake
    ///
    /// Sends `initialize`, records the child's identity, and confirms with
    /// the `initialized` notification.
    pub async fn initialize(&self) -> HubResult<InitializeResult> {
        let params = InitializeParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        };

        let value = self
            .request(methods::INITIALIZE, Some(serde_json::to_value(&params)?))
            .await?;
        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|err| HubError::protocol(format!("bad initialize result: {err}")))?;

        debug!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            "child initialized"
        );
        *self.server_info.lock().expect("server info lock poisoned") =
            Some(result.server_info.clone());

        self.transport
            .send_notification(JsonRpcNotification::new(methods::INITIALIZED, None))
            .await?;

        Ok(result)
    }

    /// Ask the child for its tool list
    pub async fn list_tools(&self) -> HubResult<Vec<Tool>> {
        let value = self.request(methods::TOOLS_LIST, Some(json!({}))).await?;
        let result: ListToolsResult = serde_json::from_value(value)
            .map_err(|err| HubError::protocol(format!("bad tools/list result: {err}")))?;
        Ok(result.tools)
    }

    /// Forward one tool call; the raw result value is returned unparsed
    ///
    /// The result stays a `Value` because children may attach content kinds
    /// the hub does not model; the caller unwraps what it needs.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> HubResult<Value> {
        self.request(
            methods::TOOLS_CALL,
            Some(json!({"name": name, "arguments": arguments})),
        )
        .await
    }

    /// Identity the child reported at initialize time
    pub fn server_info(&self) -> Option<Implementation> {
        self.server_info
            .lock()
            .expect("server info lock poisoned")
            .clone()
    }

    /// Close the underlying transport (kills a subprocess child)
    pub async fn close(&self) {
        self.transport.close().await;
    }
}
