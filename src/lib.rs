// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

//! # mcp-hub
//!
//! A universal host for [Model Context Protocol](https://modelcontextprotocol.io/)
//! servers: one process that loads independently-authored plugins at runtime,
//! aggregates their CLI verbs and tools under one namespace, exposes them to
//! interactive users and to remote MCP clients over stdio and HTTP/SSE, and
//! can proxy external MCP servers by re-exporting their tools as if native.
//!
//! ## Module Organization
//!
//! - [`core`]: Error types shared by every component
//! - [`protocol`]: JSON-RPC framing and the MCP message surface
//! - [`telemetry`]: Call history, daily journal, aggregated statistics
//! - [`plugin`]: Plugin contract, module registry, lifecycle manager
//! - [`commands`]: CLI verb registry, built-ins, interactive shell core
//! - [`dispatch`]: The tool-call dispatcher every surface routes through
//! - [`server`]: MCP sessions over stdio and HTTP/SSE transports
//! - [`proxy`]: The proxy plugin and its child MCP client
//! - [`config`]: Normalized configuration shape
//! - [`app`]: Application context wiring it all together

pub mod app;
pub mod commands;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod plugin;
pub mod protocol;
pub mod proxy;
pub mod server;
pub mod telemetry;

// Re-export commonly used types for convenience
pub use app::AppContext;
pub use core::error::{HubError, HubResult};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::app::AppContext;
    pub use crate::commands::{CommandRegistry, Shell};
    pub use crate::config::HubConfig;
    pub use crate::core::error::{HubError, HubResult};
    pub use crate::dispatch::ToolDispatcher;
    pub use crate::plugin::{
        ArgSpec, CommandOutput, CommandSpec, FnCommand, FnTool, ModuleRegistry, Plugin,
        PluginContext, PluginEvent, PluginExport, PluginHelp, PluginManager, PluginManifest,
        PluginStatus, ToolSpec,
    };
    pub use crate::protocol::types::{CallToolResult, ContentBlock, Tool};
    pub use crate::telemetry::TelemetryStore;

    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
}
