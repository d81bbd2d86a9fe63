//! Proxy plugin tests: re-export over SSE, failure modes, lifecycle verbs

mod common;

use common::FixturePlugin;
use mcp_hub::app::AppContext;
use mcp_hub::commands::Shell;
use mcp_hub::config::HubConfig;
use mcp_hub::dispatch::CLIENT_CLI;
use mcp_hub::plugin::{ModuleRegistry, Plugin, StatusIndicator};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// An "external" MCP server: a second hub exposing demo_echo over SSE
async fn start_child_hub() -> (Arc<AppContext>, String, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut modules = ModuleRegistry::new();
    modules.register("demo-package", || {
        Box::new(FixturePlugin::named("demo").with_echo_tool()) as Box<dyn Plugin>
    });
    let config = HubConfig::parse(r#"{"plugins": {"demo": {"package": "demo-package"}}}"#).unwrap();
    let ctx = AppContext::bootstrap(config, modules, dir.path()).await;
    let addr = ctx.start_sse(Some(0)).await.unwrap();
    let sse_url = format!("http://127.0.0.1:{}/sse", addr.port());
    (ctx, sse_url, dir)
}

async fn start_parent(proxy_config: serde_json::Value) -> (Arc<AppContext>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config_text = json!({
        "plugins": {"fs": {"package": "mcp-proxy", "config": proxy_config}}
    })
    .to_string();
    let config = HubConfig::parse(&config_text).unwrap();
    let ctx = AppContext::bootstrap(config, ModuleRegistry::with_builtins(), dir.path()).await;
    (ctx, dir)
}

#[tokio::test]
async fn test_proxy_re_exports_child_tools() {
    let (child, sse_url, _child_dir) = start_child_hub().await;
    let (parent, _parent_dir) =
        start_parent(json!({"url": sse_url, "autoConnect": true})).await;

    let names: Vec<String> = parent
        .manager
        .get_tools()
        .await
        .into_iter()
        .map(|tool| tool.qualified_name)
        .collect();
    assert_eq!(names, vec!["fs_demo_echo"]);

    let mut arguments = HashMap::new();
    arguments.insert("message".to_string(), json!("hi"));
    let result = parent
        .dispatcher
        .call_tool(CLIENT_CLI, "fs_demo_echo", Some(arguments))
        .await;
    assert_eq!(result.is_error, None);
    assert_eq!(result.joined_text(), "hi");

    // The child logged the forwarded call too
    assert_eq!(child.telemetry.recent(10).len(), 1);

    let summaries = parent.manager.plugins().await;
    assert_eq!(summaries[0].status.indicator, StatusIndicator::Green);
    assert_eq!(summaries[0].status.text, "1 tools");

    parent.shutdown().await;
    child.shutdown().await;
}

#[tokio::test]
async fn test_child_exit_disconnects_proxy() {
    let (child, sse_url, _child_dir) = start_child_hub().await;
    let (parent, _parent_dir) =
        start_parent(json!({"url": sse_url, "autoConnect": true})).await;

    assert_eq!(parent.manager.get_tools().await.len(), 1);

    // Kill the external server; the SSE stream ends
    child.shutdown().await;

    let mut disconnected = false;
    for _ in 0..50 {
        if parent.manager.get_tools().await.is_empty() {
            disconnected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(disconnected, "proxy tools must disappear after child exit");

    let summaries = parent.manager.plugins().await;
    assert_eq!(summaries[0].status.indicator, StatusIndicator::Red);
    assert_eq!(summaries[0].status.text, "error");

    parent.shutdown().await;
}

#[tokio::test]
async fn test_connect_twice_fails_disconnect_is_idempotent() {
    let (child, sse_url, _child_dir) = start_child_hub().await;
    let (parent, _parent_dir) =
        start_parent(json!({"url": sse_url, "autoConnect": true})).await;
    let shell = Shell::new(parent.clone());

    let result = shell.execute("connect").await;
    assert!(!result.success);
    assert!(result.output.contains("already connected"));

    let result = shell.execute("disconnect").await;
    assert!(result.success);
    assert_eq!(result.output, "[fs] disconnected");

    let result = shell.execute("disconnect").await;
    assert!(result.success);
    assert_eq!(result.output, "[fs] not connected");

    parent.shutdown().await;
    child.shutdown().await;
}

#[tokio::test]
async fn test_restart_reconnects() {
    let (child, sse_url, _child_dir) = start_child_hub().await;
    let (parent, _parent_dir) =
        start_parent(json!({"url": sse_url, "autoConnect": true})).await;
    let shell = Shell::new(parent.clone());

    let result = shell.execute("restart").await;
    assert!(result.success, "restart failed: {}", result.output);
    assert!(result.output.contains("connected (1 tools)"));
    assert_eq!(parent.manager.get_tools().await.len(), 1);

    parent.shutdown().await;
    child.shutdown().await;
}

#[tokio::test]
async fn test_spawn_failure_sets_last_error_without_failing_load() {
    let (parent, _parent_dir) = start_parent(json!({
        "command": "/nonexistent/mcp-server",
        "autoConnect": true
    }))
    .await;

    // The plugin is loaded despite the failed auto-connect
    assert!(parent.manager.is_loaded("fs").await);
    let summaries = parent.manager.plugins().await;
    assert_eq!(summaries[0].status.indicator, StatusIndicator::Red);

    let shell = Shell::new(parent.clone());
    let result = shell.execute("status").await;
    assert!(result.output.contains("disconnected"));

    let result = shell.execute("debug").await;
    assert!(result.success);
    assert!(result.output.contains("last error"));
    assert!(result.output.contains("/nonexistent/mcp-server"));

    parent.shutdown().await;
}

#[tokio::test]
async fn test_invalid_proxy_config_rejects_load() {
    let (parent, _parent_dir) = start_parent(json!({})).await;
    // Neither command nor url: init fails, the manager keeps no instance
    assert!(!parent.manager.is_loaded("fs").await);
    parent.shutdown().await;
}

#[tokio::test]
async fn test_proxy_commands_without_connection() {
    let (parent, _parent_dir) = start_parent(json!({
        "command": "/usr/bin/true"
    }))
    .await;
    let shell = Shell::new(parent.clone());

    let result = shell.execute("status").await;
    assert!(result.success);
    assert_eq!(result.output, "[fs] disconnected");

    // Tool calls against a disconnected proxy see no tools at all
    let result = shell.execute("call fs read_file path=/etc/hosts").await;
    assert!(!result.success);
    assert!(result.output.contains("Unknown tool: fs_read_file"));

    parent.shutdown().await;
}
