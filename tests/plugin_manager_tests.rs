//! Plugin manager lifecycle and visibility tests

mod common;

use common::{FixturePlugin, hook_entries, new_hook_log};
use mcp_hub::core::error::HubError;
use mcp_hub::plugin::{ModuleRegistry, Plugin, PluginEvent, PluginManager};
use serde_json::json;
use std::sync::Arc;

fn manager_with_demo() -> PluginManager {
    let mut modules = ModuleRegistry::new();
    modules.register("demo-package", || {
        Box::new(
            FixturePlugin::named("demo")
                .with_echo_tool()
                .with_named_tool("danger"),
        ) as Box<dyn Plugin>
    });
    PluginManager::new(modules)
}

fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<PluginEvent>) -> Vec<PluginEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_load_emits_exactly_one_loaded_event() {
    let manager = manager_with_demo();
    let mut rx = manager.subscribe();

    manager
        .load_plugin("demo", "demo-package", json!({}), vec![])
        .await
        .unwrap();

    let events = drain_events(&mut rx);
    assert_eq!(
        events,
        vec![PluginEvent::Loaded {
            plugin: "demo".to_string()
        }]
    );
}

#[tokio::test]
async fn test_duplicate_registration_name_is_rejected() {
    let manager = manager_with_demo();
    manager
        .load_plugin("demo", "demo-package", json!({}), vec![])
        .await
        .unwrap();

    let err = manager
        .load_plugin("demo", "demo-package", json!({}), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::DuplicateName(_)));
}

#[tokio::test]
async fn test_same_package_loads_under_two_names() {
    let manager = manager_with_demo();
    manager
        .load_plugin("a", "demo-package", json!({}), vec![])
        .await
        .unwrap();
    manager
        .load_plugin("b", "demo-package", json!({}), vec![])
        .await
        .unwrap();

    let names: Vec<String> = manager
        .get_tools()
        .await
        .into_iter()
        .map(|tool| tool.qualified_name)
        .collect();
    assert!(names.contains(&"a_echo".to_string()));
    assert!(names.contains(&"b_echo".to_string()));
}

#[tokio::test]
async fn test_init_failure_preserves_message_and_leaves_clean_state() {
    let mut modules = ModuleRegistry::new();
    modules.register("broken", || {
        Box::new(FixturePlugin::named("broken").with_fail_init("no database")) as Box<dyn Plugin>
    });
    let manager = PluginManager::new(modules);
    let mut rx = manager.subscribe();

    let err = manager
        .load_plugin("broken", "broken", json!({}), vec![])
        .await
        .unwrap_err();
    match err {
        HubError::LoadFailure(message) => assert!(message.contains("no database")),
        other => panic!("expected LoadFailure, got {other:?}"),
    }

    assert!(!manager.is_loaded("broken").await);
    assert!(drain_events(&mut rx).is_empty());
}

#[tokio::test]
async fn test_duplicate_tool_names_are_invalid() {
    let mut modules = ModuleRegistry::new();
    modules.register("dupes", || {
        Box::new(FixturePlugin::named("dupes").with_duplicate_tools()) as Box<dyn Plugin>
    });
    let manager = PluginManager::new(modules);

    let err = manager
        .load_plugin("dupes", "dupes", json!({}), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::InvalidPlugin(_)));
}

#[tokio::test]
async fn test_unknown_package_fails_load() {
    let manager = PluginManager::new(ModuleRegistry::new());
    let err = manager
        .load_plugin("x", "missing-package", json!({}), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::LoadFailure(_)));
}

#[tokio::test]
async fn test_unload_then_reload_yields_fresh_instance() {
    let hooks = new_hook_log();
    let mut modules = ModuleRegistry::new();
    let ctor_hooks = hooks.clone();
    modules.register("demo-package", move || {
        Box::new(
            FixturePlugin::named("demo")
                .with_echo_tool()
                .with_hooks(ctor_hooks.clone()),
        ) as Box<dyn Plugin>
    });
    let manager = PluginManager::new(modules);
    let mut rx = manager.subscribe();

    manager
        .load_plugin("demo", "demo-package", json!({}), vec![])
        .await
        .unwrap();
    manager.unload_plugin("demo").await.unwrap();
    assert!(!manager.is_loaded("demo").await);
    manager
        .load_plugin("demo", "demo-package", json!({}), vec![])
        .await
        .unwrap();

    assert_eq!(hook_entries(&hooks), vec!["init", "destroy", "init"]);
    let events = drain_events(&mut rx);
    assert_eq!(
        events,
        vec![
            PluginEvent::Loaded {
                plugin: "demo".to_string()
            },
            PluginEvent::Unloaded {
                plugin: "demo".to_string()
            },
            PluginEvent::Loaded {
                plugin: "demo".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn test_unload_unknown_plugin() {
    let manager = manager_with_demo();
    let err = manager.unload_plugin("ghost").await.unwrap_err();
    assert!(matches!(err, HubError::UnknownPlugin(_)));
}

#[tokio::test]
async fn test_disable_hides_tools_and_enable_is_idempotent() {
    let hooks = new_hook_log();
    let mut modules = ModuleRegistry::new();
    let ctor_hooks = hooks.clone();
    modules.register("demo-package", move || {
        Box::new(
            FixturePlugin::named("demo")
                .with_echo_tool()
                .with_hooks(ctor_hooks.clone()),
        ) as Box<dyn Plugin>
    });
    let manager = PluginManager::new(modules);
    manager
        .load_plugin("demo", "demo-package", json!({}), vec![])
        .await
        .unwrap();
    let mut rx = manager.subscribe();

    manager.disable_plugin("demo").await.unwrap();
    assert!(manager.get_tools().await.is_empty());
    assert!(manager.get_cli_commands().await.is_empty());

    // Second disable is a no-op: no hook, no event
    manager.disable_plugin("demo").await.unwrap();

    manager.enable_plugin("demo").await.unwrap();
    assert_eq!(manager.get_tools().await.len(), 1);
    manager.enable_plugin("demo").await.unwrap();

    assert_eq!(hook_entries(&hooks), vec!["init", "disable", "enable"]);
    let events = drain_events(&mut rx);
    assert_eq!(
        events,
        vec![
            PluginEvent::Disabled {
                plugin: "demo".to_string()
            },
            PluginEvent::Enabled {
                plugin: "demo".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn test_tool_mask_round_trip() {
    let manager = manager_with_demo();
    manager
        .load_plugin("demo", "demo-package", json!({}), vec![])
        .await
        .unwrap();

    let before: Vec<String> = manager
        .get_tools()
        .await
        .into_iter()
        .map(|tool| tool.qualified_name)
        .collect();
    assert!(before.contains(&"demo_danger".to_string()));

    manager.disable_tool("demo", "danger").await.unwrap();
    let masked: Vec<String> = manager
        .get_tools()
        .await
        .into_iter()
        .map(|tool| tool.qualified_name)
        .collect();
    assert!(!masked.contains(&"demo_danger".to_string()));
    assert!(masked.contains(&"demo_echo".to_string()));

    manager.enable_tool("demo", "danger").await.unwrap();
    let after: Vec<String> = manager
        .get_tools()
        .await
        .into_iter()
        .map(|tool| tool.qualified_name)
        .collect();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_disable_unknown_tool_fails_enable_is_permissive() {
    let manager = manager_with_demo();
    manager
        .load_plugin("demo", "demo-package", json!({}), vec![])
        .await
        .unwrap();

    let err = manager.disable_tool("demo", "ghost").await.unwrap_err();
    assert!(matches!(err, HubError::UnknownTool(_)));

    // Removing a mask entry that does not exist is fine
    manager.enable_tool("demo", "ghost").await.unwrap();
}

#[tokio::test]
async fn test_config_mask_applies_at_load() {
    let manager = manager_with_demo();
    manager
        .load_plugin("demo", "demo-package", json!({}), vec!["danger".to_string()])
        .await
        .unwrap();

    let names: Vec<String> = manager
        .get_tools()
        .await
        .into_iter()
        .map(|tool| tool.qualified_name)
        .collect();
    assert_eq!(names, vec!["demo_echo"]);

    let inventory = manager.tool_inventory("demo").await.unwrap();
    let masked: Vec<(String, bool)> = inventory
        .into_iter()
        .map(|(spec, masked)| (spec.name, masked))
        .collect();
    assert!(masked.contains(&("danger".to_string(), true)));
    assert!(masked.contains(&("echo".to_string(), false)));
}

#[tokio::test]
async fn test_state_change_events_mark_visibility() {
    let manager = Arc::new(manager_with_demo());
    manager
        .load_plugin("demo", "demo-package", json!({}), vec![])
        .await
        .unwrap();
    let mut rx = manager.subscribe();

    manager.disable_tool("demo", "danger").await.unwrap();
    let events = drain_events(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(events[0].changes_tool_visibility());
    assert_eq!(events[0].plugin(), "demo");
}
