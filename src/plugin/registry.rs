//! Plugin module registry
//!
//! Maps module specifiers (the `package` field of the config) to constructor
//! functions. Plugin code is compiled into the host binary, so "loading a
//! module" resolves against this registry. Embedders register additional
//! packages before the manager starts loading.

use crate::plugin::api::{Plugin, PluginConstructor};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of loadable plugin packages
#[derive(Default)]
pub struct ModuleRegistry {
    constructors: BTreeMap<String, PluginConstructor>,
}

impl ModuleRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the packages shipped in this crate
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("mcp-proxy", || {
            Box::new(crate::proxy::ProxyPlugin::new()) as Box<dyn Plugin>
        });
        registry
    }

    /// Register a package under the given module specifier
    pub fn register<F>(&mut self, package: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.constructors
            .insert(package.into(), Arc::new(constructor));
    }

    /// Resolve a module specifier to its constructor
    pub fn resolve(&self, package: &str) -> Option<PluginConstructor> {
        self.constructors.get(package).cloned()
    }

    /// All registered module specifiers
    pub fn packages(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("packages", &self.packages())
            .finish()
    }
}
