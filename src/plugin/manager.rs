// ! Plugin lifecycle manager
// !
// ! Owns every loaded plugin instance, mediates enable/disable at plugin and
// ! tool granularity, publishes lifecycle events over a broadcast bus (the
// ! MCP sessions subscribe; the manager knows nothing about them), and
// ! exposes the aggregated views of tools and CLI verbs the dispatcher and
// ! command registry consume.

use crate::core::error::{HubError, HubResult};
use crate::plugin::api::{
    CommandSpec, Plugin, PluginExport, PluginHelp, PluginManifest, PluginStatus, ToolSpec,
};
use crate::plugin::context::PluginContext;
use crate::plugin::registry::ModuleRegistry;
use crate::plugin::PluginEvent;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, broadcast};
use tracing::{info, warn};

/// A visible tool, renamed to its fully-qualified form
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    /// `<plugin>_<local>` name MCP clients see
    pub qualified_name: String,
    /// Registration name of the origin plugin
    pub plugin: String,
    pub spec: ToolSpec,
}

/// A visible CLI verb, tagged with its origin plugin
#[derive(Debug, Clone)]
pub struct RegisteredCommand {
    pub plugin: String,
    pub spec: CommandSpec,
}

/// Listing row for one loaded plugin
#[derive(Debug, Clone)]
pub struct PluginSummary {
    pub name: String,
    pub manifest: PluginManifest,
    pub enabled: bool,
    pub status: PluginStatus,
}

/// One loaded plugin and its runtime state
struct PluginInstance {
    /// Registration name (config key, not the manifest name)
    name: String,
    manifest: PluginManifest,
    plugin: RwLock<Box<dyn Plugin>>,
    enabled: AtomicBool,
    /// Local tool names masked out of the visible set
    disabled_tools: std::sync::RwLock<HashSet<String>>,
}

impl PluginInstance {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn is_tool_masked(&self, local_name: &str) -> bool {
        self.disabled_tools
            .read()
            .expect("mask lock poisoned")
            .contains(local_name)
    }
}

/// Capacity of the lifecycle event bus
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Manager owning all plugin instances
pub struct PluginManager {
    modules: ModuleRegistry,
    instances: RwLock<BTreeMap<String, Arc<PluginInstance>>>,
    events: broadcast::Sender<PluginEvent>,
}

impl PluginManager {
    pub fn new(modules: ModuleRegistry) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            modules,
            instances: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: PluginEvent) {
        let _ = self.events.send(event);
    }

    /// Load a plugin module under the given registration name
    ///
    /// Resolves the module, runs the constructor once, validates the shape,
    /// and initializes with a fresh context. A failed load leaves no partial
    /// instance behind.
    pub async fn load_plugin(
        &self,
        name: &str,
        package: &str,
        config: Value,
        disabled_tools: Vec<String>,
    ) -> HubResult<()> {
        if self.instances.read().await.contains_key(name) {
            return Err(HubError::DuplicateName(name.to_string()));
        }

        let constructor = self.modules.resolve(package).ok_or_else(|| {
            HubError::LoadFailure(format!("cannot resolve module '{package}'"))
        })?;

        let mut plugin = constructor();
        let manifest = plugin.manifest();
        validate_manifest(&manifest)?;
        validate_exports(&plugin.exports())?;

        let context = PluginContext::new(name.to_string(), config, self.events.clone());
        plugin
            .init(context)
            .await
            .map_err(|err| HubError::LoadFailure(err.to_string()))?;

        let instance = Arc::new(PluginInstance {
            name: name.to_string(),
            manifest,
            plugin: RwLock::new(plugin),
            enabled: AtomicBool::new(true),
            disabled_tools: std::sync::RwLock::new(disabled_tools.into_iter().collect()),
        });

        {
            let mut instances = self.instances.write().await;
            // A concurrent load may have claimed the name while init ran
            if instances.contains_key(name) {
                let mut plugin = instance.plugin.write().await;
                let _ = plugin.destroy().await;
                return Err(HubError::DuplicateName(name.to_string()));
            }
            instances.insert(name.to_string(), instance);
        }

        info!(plugin = name, package, "plugin loaded");
        self.emit(PluginEvent::Loaded {
            plugin: name.to_string(),
        });
        Ok(())
    }

    /// Destroy and remove a plugin
    pub async fn unload_plugin(&self, name: &str) -> HubResult<()> {
        let instance = {
            let mut instances = self.instances.write().await;
            instances
                .remove(name)
                .ok_or_else(|| HubError::UnknownPlugin(name.to_string()))?
        };

        {
            let mut plugin = instance.plugin.write().await;
            if let Err(err) = plugin.destroy().await {
                warn!(plugin = name, %err, "plugin destroy failed");
            }
        }

        info!(plugin = name, "plugin unloaded");
        self.emit(PluginEvent::Unloaded {
            plugin: name.to_string(),
        });
        Ok(())
    }

    async fn instance(&self, name: &str) -> HubResult<Arc<PluginInstance>> {
        self.instances
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| HubError::UnknownPlugin(name.to_string()))
    }

    /// Enable a plugin; a no-op when already enabled
    pub async fn enable_plugin(&self, name: &str) -> HubResult<()> {
        let instance = self.instance(name).await?;
        if instance.enabled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let mut plugin = instance.plugin.write().await;
            if let Err(err) = plugin.on_enable().await {
                warn!(plugin = name, %err, "on_enable hook failed");
            }
        }
        self.emit(PluginEvent::Enabled {
            plugin: name.to_string(),
        });
        Ok(())
    }

    /// Disable a plugin; a no-op when already disabled
    pub async fn disable_plugin(&self, name: &str) -> HubResult<()> {
        let instance = self.instance(name).await?;
        if !instance.enabled.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let mut plugin = instance.plugin.write().await;
            if let Err(err) = plugin.on_disable().await {
                warn!(plugin = name, %err, "on_disable hook failed");
            }
        }
        self.emit(PluginEvent::Disabled {
            plugin: name.to_string(),
        });
        Ok(())
    }

    /// Unmask a tool; removing an absent mask entry is a no-op
    pub async fn enable_tool(&self, plugin_name: &str, local_name: &str) -> HubResult<()> {
        let instance = self.instance(plugin_name).await?;
        instance
            .disabled_tools
            .write()
            .expect("mask lock poisoned")
            .remove(local_name);
        self.emit(PluginEvent::StateChange {
            plugin: plugin_name.to_string(),
        });
        Ok(())
    }

    /// Mask a tool out of the visible set; the tool must exist
    pub async fn disable_tool(&self, plugin_name: &str, local_name: &str) -> HubResult<()> {
        let instance = self.instance(plugin_name).await?;

        let exists = {
            let plugin = instance.plugin.read().await;
            plugin.exports().iter().any(|export| {
                matches!(export, PluginExport::Tool(spec) if spec.name == local_name)
            })
        };
        if !exists {
            return Err(HubError::UnknownTool(format!(
                "{plugin_name}_{local_name}"
            )));
        }

        instance
            .disabled_tools
            .write()
            .expect("mask lock poisoned")
            .insert(local_name.to_string());
        self.emit(PluginEvent::StateChange {
            plugin: plugin_name.to_string(),
        });
        Ok(())
    }

    /// Currently visible tools across all enabled plugins
    ///
    /// Each tool is renamed to `<plugin>_<local>` and annotated with its
    /// origin. The result is a snapshot; callers never iterate live state.
    pub async fn get_tools(&self) -> Vec<RegisteredTool> {
        let instances: Vec<Arc<PluginInstance>> =
            self.instances.read().await.values().cloned().collect();

        let mut tools = Vec::new();
        for instance in instances {
            if !instance.is_enabled() {
                continue;
            }
            let plugin = instance.plugin.read().await;
            for export in plugin.exports() {
                if let PluginExport::Tool(spec) = export {
                    if instance.is_tool_masked(&spec.name) {
                        continue;
                    }
                    tools.push(RegisteredTool {
                        qualified_name: format!("{}_{}", instance.name, spec.name),
                        plugin: instance.name.clone(),
                        spec,
                    });
                }
            }
        }
        tools
    }

    /// Currently visible CLI verbs across all enabled plugins
    pub async fn get_cli_commands(&self) -> Vec<RegisteredCommand> {
        let instances: Vec<Arc<PluginInstance>> =
            self.instances.read().await.values().cloned().collect();

        let mut commands = Vec::new();
        for instance in instances {
            if !instance.is_enabled() {
                continue;
            }
            let plugin = instance.plugin.read().await;
            for export in plugin.exports() {
                if let PluginExport::Command(spec) = export {
                    commands.push(RegisteredCommand {
                        plugin: instance.name.clone(),
                        spec,
                    });
                }
            }
        }
        commands
    }

    /// Every tool of one plugin with its masked flag, including hidden ones
    pub async fn tool_inventory(&self, plugin_name: &str) -> HubResult<Vec<(ToolSpec, bool)>> {
        let instance = self.instance(plugin_name).await?;
        let plugin = instance.plugin.read().await;
        Ok(plugin
            .exports()
            .into_iter()
            .filter_map(|export| match export {
                PluginExport::Tool(spec) => {
                    let masked = instance.is_tool_masked(&spec.name);
                    Some((spec, masked))
                }
                PluginExport::Command(_) => None,
            })
            .collect())
    }

    /// Listing rows for every loaded plugin
    pub async fn plugins(&self) -> Vec<PluginSummary> {
        let instances: Vec<Arc<PluginInstance>> =
            self.instances.read().await.values().cloned().collect();

        let mut summaries = Vec::new();
        for instance in instances {
            let plugin = instance.plugin.read().await;
            summaries.push(PluginSummary {
                name: instance.name.clone(),
                manifest: instance.manifest.clone(),
                enabled: instance.is_enabled(),
                status: plugin.status(),
            });
        }
        summaries
    }

    /// Whether a plugin with this registration name is loaded
    pub async fn is_loaded(&self, name: &str) -> bool {
        self.instances.read().await.contains_key(name)
    }

    /// Structured documentation for one plugin
    pub async fn help(&self, name: &str) -> HubResult<PluginHelp> {
        let instance = self.instance(name).await?;
        let plugin = instance.plugin.read().await;
        Ok(plugin.help())
    }

    /// Destroy every plugin, in registration order
    pub async fn destroy_all(&self) {
        let instances: Vec<Arc<PluginInstance>> = {
            let mut map = self.instances.write().await;
            let drained = map.values().cloned().collect();
            map.clear();
            drained
        };

        for instance in instances {
            let mut plugin = instance.plugin.write().await;
            if let Err(err) = plugin.destroy().await {
                warn!(plugin = %instance.name, %err, "plugin destroy failed");
            }
        }
    }
}

fn validate_manifest(manifest: &PluginManifest) -> HubResult<()> {
    if manifest.name.trim().is_empty() {
        return Err(HubError::InvalidPlugin("manifest name is empty".to_string()));
    }
    if manifest.version.trim().is_empty() {
        return Err(HubError::InvalidPlugin(format!(
            "plugin '{}' has an empty version",
            manifest.name
        )));
    }
    Ok(())
}

fn validate_exports(exports: &[PluginExport]) -> HubResult<()> {
    let mut seen = HashSet::new();
    for export in exports {
        if let PluginExport::Tool(spec) = export {
            if !seen.insert(spec.name.clone()) {
                return Err(HubError::InvalidPlugin(format!(
                    "duplicate tool name '{}'",
                    spec.name
                )));
            }
        }
    }
    Ok(())
}
