//! Application context
//!
//! One object owning the shared singletons (plugin manager, dispatcher,
//! telemetry, the optional SSE listener) so nothing lives in globals. Tests
//! construct a fresh context for isolation; the binary builds exactly one.

use crate::config::HubConfig;
use crate::core::error::{HubError, HubResult};
use crate::dispatch::ToolDispatcher;
use crate::plugin::{ModuleRegistry, PluginManager};
use crate::server::sse::{SseServerHandle, start_sse_server};
use crate::telemetry::{DEFAULT_HISTORY_CAPACITY, TelemetryStore};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Owns the runtime singletons and the SSE listener lifecycle
pub struct AppContext {
    config: HubConfig,
    pub manager: Arc<PluginManager>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub telemetry: Arc<TelemetryStore>,
    sse: Mutex<Option<SseServerHandle>>,
}

impl AppContext {
    /// Build the context and load every configured plugin
    ///
    /// Individual plugin load failures are logged and skipped; only config
    /// or state-dir problems are fatal to startup.
    pub async fn bootstrap(
        config: HubConfig,
        modules: ModuleRegistry,
        state_dir: &Path,
    ) -> Arc<Self> {
        let telemetry = TelemetryStore::new(state_dir, DEFAULT_HISTORY_CAPACITY);
        let manager = Arc::new(PluginManager::new(modules));
        let dispatcher = Arc::new(ToolDispatcher::new(manager.clone(), telemetry.clone()));

        let context = Arc::new(Self {
            config,
            manager,
            dispatcher,
            telemetry,
            sse: Mutex::new(None),
        });

        for (name, entry) in &context.config.plugins {
            let result = context
                .manager
                .load_plugin(
                    name,
                    &entry.package,
                    entry.config.clone(),
                    entry.disabled_tools.clone(),
                )
                .await;
            if let Err(err) = result {
                warn!(plugin = %name, %err, "plugin failed to load");
            }
        }

        context
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Start the SSE listener; `port` overrides the configured one
    pub async fn start_sse(&self, port: Option<u16>) -> HubResult<SocketAddr> {
        let mut guard = self.sse.lock().await;
        if guard.is_some() {
            return Err(HubError::transport("SSE server is already running"));
        }
        let handle = start_sse_server(
            self.dispatcher.clone(),
            self.manager.clone(),
            port.unwrap_or(self.config.mcp.port),
        )
        .await?;
        let addr = handle.addr();
        *guard = Some(handle);
        Ok(addr)
    }

    /// Stop the SSE listener; returns whether one was running
    pub async fn stop_sse(&self) -> bool {
        let handle = self.sse.lock().await.take();
        match handle {
            Some(handle) => {
                handle.stop().await;
                true
            }
            None => false,
        }
    }

    /// Bound address and client count of the running listener, if any
    pub async fn sse_status(&self) -> Option<(SocketAddr, usize)> {
        let guard = self.sse.lock().await;
        guard
            .as_ref()
            .map(|handle| (handle.addr(), handle.client_count()))
    }

    /// Orderly shutdown: listener, plugins (and their children), telemetry
    pub async fn shutdown(&self) {
        self.stop_sse().await;
        self.manager.destroy_all().await;
        self.telemetry.flush().await;
    }
}
