//! Proxy sub-runtime
//!
//! Hosts external MCP servers as children (spawned subprocess or SSE URL)
//! and re-exports their discovered tools through the regular plugin surface.

pub mod client;
pub mod plugin;
pub mod transport;

pub use client::ProxyClient;
pub use plugin::{ProxyConfig, ProxyPlugin};
pub use transport::{ChildTransport, SseChildTransport, StdioChildTransport};
