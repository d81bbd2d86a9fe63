//! MCP session request-routing tests

mod common;

use common::FixturePlugin;
use mcp_hub::dispatch::ToolDispatcher;
use mcp_hub::plugin::{ModuleRegistry, Plugin, PluginManager};
use mcp_hub::protocol::types::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, error_codes,
};
use mcp_hub::server::McpSession;
use mcp_hub::telemetry::TelemetryStore;
use serde_json::json;
use std::sync::Arc;

async fn session() -> (McpSession, Arc<TelemetryStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut modules = ModuleRegistry::new();
    modules.register("demo-package", || {
        Box::new(FixturePlugin::named("demo").with_echo_tool()) as Box<dyn Plugin>
    });
    let manager = Arc::new(PluginManager::new(modules));
    manager
        .load_plugin("demo", "demo-package", json!({}), vec![])
        .await
        .unwrap();
    let telemetry = TelemetryStore::new(dir.path(), 100);
    let dispatcher = Arc::new(ToolDispatcher::new(manager.clone(), telemetry.clone()));
    (
        McpSession::new("test-client", dispatcher, manager),
        telemetry,
        dir,
    )
}

fn request(id: i64, method: &str, params: Option<serde_json::Value>) -> JsonRpcRequest {
    JsonRpcRequest::new(json!(id), method, params)
}

#[tokio::test]
async fn test_initialize_handshake() {
    let (session, _telemetry, _dir) = session().await;

    let reply = session
        .handle_request(request(
            1,
            "initialize",
            Some(json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "0.0.1"}
            })),
        ))
        .await;

    let JsonRpcMessage::Response(response) = reply else {
        panic!("expected a success response");
    };
    assert_eq!(response.id, json!(1));
    assert_eq!(response.result["protocolVersion"], "2025-06-18");
    assert_eq!(response.result["capabilities"]["tools"]["listChanged"], true);
    assert_eq!(response.result["serverInfo"]["name"], "mcp-hub");

    assert!(!session.is_initialized());
    let confirm = session
        .handle_message(JsonRpcMessage::Notification(JsonRpcNotification::new(
            "notifications/initialized",
            None,
        )))
        .await;
    assert!(confirm.is_none());
    assert!(session.is_initialized());
}

#[tokio::test]
async fn test_initialize_without_params_is_invalid() {
    let (session, _telemetry, _dir) = session().await;
    let reply = session.handle_request(request(1, "initialize", None)).await;
    let JsonRpcMessage::Error(error) = reply else {
        panic!("expected an error response");
    };
    assert_eq!(error.error.code, error_codes::INVALID_PARAMS);
}

#[tokio::test]
async fn test_tools_list_uses_qualified_names() {
    let (session, _telemetry, _dir) = session().await;

    let reply = session.handle_request(request(2, "tools/list", None)).await;
    let JsonRpcMessage::Response(response) = reply else {
        panic!("expected a success response");
    };

    let tools = response.result["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "demo_echo");
    assert_eq!(tools[0]["inputSchema"]["type"], "object");
}

#[tokio::test]
async fn test_tools_call_round_trip() {
    let (session, telemetry, _dir) = session().await;

    let reply = session
        .handle_request(request(
            3,
            "tools/call",
            Some(json!({"name": "demo_echo", "arguments": {"message": "hi"}})),
        ))
        .await;

    let JsonRpcMessage::Response(response) = reply else {
        panic!("expected a success response");
    };
    assert_eq!(response.result["content"][0]["type"], "text");
    assert_eq!(response.result["content"][0]["text"], "hi");
    assert!(response.result.get("isError").is_none());

    let entries = telemetry.recent(10);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].client_id, "test-client");
}

#[tokio::test]
async fn test_unknown_tool_call_is_error_content() {
    let (session, _telemetry, _dir) = session().await;

    let reply = session
        .handle_request(request(
            4,
            "tools/call",
            Some(json!({"name": "demo_missing", "arguments": {}})),
        ))
        .await;

    let JsonRpcMessage::Response(response) = reply else {
        panic!("expected a success response carrying isError");
    };
    assert_eq!(response.result["isError"], true);
    assert_eq!(
        response.result["content"][0]["text"],
        "Unknown tool: demo_missing"
    );
}

#[tokio::test]
async fn test_unknown_method_is_method_not_found() {
    let (session, _telemetry, _dir) = session().await;
    let reply = session
        .handle_request(request(5, "resources/list", None))
        .await;
    let JsonRpcMessage::Error(error) = reply else {
        panic!("expected an error response");
    };
    assert_eq!(error.error.code, error_codes::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_ping_returns_empty_object() {
    let (session, _telemetry, _dir) = session().await;
    let reply = session.handle_request(request(6, "ping", None)).await;
    let JsonRpcMessage::Response(response) = reply else {
        panic!("expected a success response");
    };
    assert_eq!(response.result, json!({}));
}

#[tokio::test]
async fn test_list_changed_notification_shape() {
    let notification = McpSession::list_changed_notification();
    assert_eq!(notification.method, "notifications/tools/list_changed");
    let line = serde_json::to_string(&notification).unwrap();
    assert!(line.contains("\"jsonrpc\":\"2.0\""));
}
