//! Command registry and shell routing tests

mod common;

use common::FixturePlugin;
use mcp_hub::app::AppContext;
use mcp_hub::commands::{CommandRegistry, Shell};
use mcp_hub::config::HubConfig;
use mcp_hub::plugin::{ModuleRegistry, Plugin};
use serde_json::json;
use std::sync::Arc;

/// A context with plugins `a` and `b` both claiming the `status` verb
async fn context_with_router_verb() -> (Arc<AppContext>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut modules = ModuleRegistry::new();
    modules.register("claimant", || {
        Box::new(
            FixturePlugin::named("claimant")
                .with_status_command()
                .with_echo_tool(),
        ) as Box<dyn Plugin>
    });

    let config = HubConfig::parse(
        r#"{
            "plugins": {
                "a": {"package": "claimant"},
                "b": {"package": "claimant"}
            }
        }"#,
    )
    .unwrap();

    let ctx = AppContext::bootstrap(config, modules, dir.path()).await;
    (ctx, dir)
}

#[tokio::test]
async fn test_router_verb_without_selector_lists_claimants() {
    let (ctx, _dir) = context_with_router_verb().await;
    let shell = Shell::new(ctx);

    let result = shell.execute("status").await;
    assert!(!result.success);
    assert!(result.output.contains("a, b"));
}

#[tokio::test]
async fn test_router_verb_with_selector_forwards_remaining_args() {
    let (ctx, _dir) = context_with_router_verb().await;
    let shell = Shell::new(ctx);

    let result = shell.execute("status a extra").await;
    assert!(result.success);
    assert_eq!(result.output, "[a] extra");
}

#[tokio::test]
async fn test_router_verb_with_unknown_selector_fails() {
    let (ctx, _dir) = context_with_router_verb().await;
    let shell = Shell::new(ctx);

    let result = shell.execute("status ghost").await;
    assert!(!result.success);
    assert!(result.output.contains("a, b"));
}

#[tokio::test]
async fn test_router_reverts_to_direct_after_unload() {
    let (ctx, _dir) = context_with_router_verb().await;
    let shell = Shell::new(ctx.clone());

    ctx.manager.unload_plugin("b").await.unwrap();
    // One claimant left: direct dispatch, args no longer select a plugin
    let result = shell.execute("status hello").await;
    assert!(result.success);
    assert_eq!(result.output, "[a] hello");

    ctx.manager.unload_plugin("a").await.unwrap();
    let result = shell.execute("status").await;
    assert!(!result.success);
    assert!(result.output.contains("Unknown command"));
}

#[tokio::test]
async fn test_completions_follow_unload_transitions() {
    let (ctx, _dir) = context_with_router_verb().await;
    let registry = CommandRegistry::new(ctx.manager.clone());

    let completions = registry.completions().await;
    assert!(completions.contains(&"status".to_string()));
    assert_eq!(
        completions.iter().filter(|verb| *verb == "status").count(),
        1,
        "router verbs appear once"
    );

    ctx.manager.unload_plugin("a").await.unwrap();
    ctx.manager.unload_plugin("b").await.unwrap();
    let completions = registry.completions().await;
    assert!(!completions.contains(&"status".to_string()));
    assert!(completions.contains(&"help".to_string()));
}

#[tokio::test]
async fn test_empty_input_is_successful_noop() {
    let (ctx, _dir) = context_with_router_verb().await;
    let shell = Shell::new(ctx);

    for line in ["", "   ", "\t"] {
        let result = shell.execute(line).await;
        assert!(result.success);
        assert_eq!(result.output, "");
    }
}

#[tokio::test]
async fn test_unknown_verb_fails() {
    let (ctx, _dir) = context_with_router_verb().await;
    let shell = Shell::new(ctx);

    let result = shell.execute("frobnicate now").await;
    assert!(!result.success);
    assert_eq!(result.output, "Unknown command: frobnicate");
}

#[tokio::test]
async fn test_plugin_verb_shadowing_builtin_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut modules = ModuleRegistry::new();
    modules.register("shadow", || {
        Box::new(FixturePlugin::named("shadow").with_shadowing_command()) as Box<dyn Plugin>
    });
    let config =
        HubConfig::parse(r#"{"plugins": {"shadow": {"package": "shadow"}}}"#).unwrap();
    let ctx = AppContext::bootstrap(config, modules, dir.path()).await;
    let shell = Shell::new(ctx);

    // The built-in help answers, not the plugin
    let result = shell.execute("help").await;
    assert!(result.success);
    assert!(result.output.contains("Built-in commands"));
    assert!(!result.output.contains("shadowed"));
}

#[tokio::test]
async fn test_handler_error_becomes_failed_result() {
    let dir = tempfile::tempdir().unwrap();
    let mut modules = ModuleRegistry::new();
    modules.register("fragile", || {
        Box::new(FixturePlugin::named("fragile").with_failing_command()) as Box<dyn Plugin>
    });
    let config =
        HubConfig::parse(r#"{"plugins": {"fragile": {"package": "fragile"}}}"#).unwrap();
    let ctx = AppContext::bootstrap(config, modules, dir.path()).await;
    let shell = Shell::new(ctx);

    let result = shell.execute("explode").await;
    assert!(!result.success);
    assert_eq!(result.output, "[fragile] command failed");
}

#[tokio::test]
async fn test_quoted_arguments_arrive_as_one_token() {
    let (ctx, _dir) = context_with_router_verb().await;
    let shell = Shell::new(ctx);

    let result = shell.execute(r#"status a "two words""#).await;
    assert!(result.success);
    assert_eq!(result.output, "[a] two words");
}

#[tokio::test]
async fn test_call_builtin_parses_key_value_arguments() {
    let (ctx, _dir) = context_with_router_verb().await;
    let shell = Shell::new(ctx);

    let result = shell.execute(r#"call a echo message="hi there""#).await;
    assert!(result.success);
    assert_eq!(result.output, "hi there");

    // JSON values decode; non-JSON falls back to the raw string
    let result = shell.execute("call a echo message=42").await;
    assert!(!result.success, "schema requires a string message");
}

#[tokio::test]
async fn test_builtin_lookup_is_case_insensitive_in_shell() {
    let (ctx, _dir) = context_with_router_verb().await;
    let shell = Shell::new(ctx);

    let result = shell.execute("HELP").await;
    assert!(result.success);
    assert!(result.output.contains("Built-in commands"));
}

#[tokio::test]
async fn test_plugins_and_tools_builtins_round_trip() {
    let (ctx, _dir) = context_with_router_verb().await;
    let shell = Shell::new(ctx);

    let listing = shell.execute("plugins").await;
    assert!(listing.success);
    assert!(listing.output.contains("a v1.2.3 [enabled]"));

    let result = shell.execute("tools disable a echo").await;
    assert!(result.success);
    let listing = shell.execute("tools list a").await;
    assert!(listing.output.contains("a_echo [disabled]"));

    let result = shell.execute("tools enable a echo").await;
    assert!(result.success);
    let listing = shell.execute("tools").await;
    assert!(listing.output.contains("a_echo"));
    assert!(!listing.output.contains("[disabled]"));
}

#[tokio::test]
async fn test_logs_builtin_shows_recorded_calls() {
    let (ctx, _dir) = context_with_router_verb().await;
    let shell = Shell::new(ctx);

    shell.execute("call a echo message=hi").await;
    let result = shell.execute("logs").await;
    assert!(result.success);
    assert!(result.output.contains("a_echo"));

    let result = shell.execute("logs clear").await;
    assert!(result.success);
    let result = shell.execute("logs").await;
    assert_eq!(result.output, "No calls logged");
}

#[tokio::test]
async fn test_stats_builtin_reports_and_resets() {
    let (ctx, _dir) = context_with_router_verb().await;
    let shell = Shell::new(ctx);

    shell.execute("call a echo message=hi").await;
    shell.execute("call a echo message=ho").await;

    let result = shell.execute("stats").await;
    assert!(result.output.contains("2 calls"));

    let result = shell.execute("stats a_echo").await;
    assert!(result.success);
    assert!(result.output.contains("2 calls"));

    let result = shell.execute("stats reset").await;
    assert!(result.success);
    let result = shell.execute("stats ghost_tool").await;
    assert!(!result.success);
}
