//! MCP server surface
//!
//! Two transports share one session skeleton: a single stdio session bound
//! to the process streams, and an HTTP/SSE listener with one isolated
//! session per connected client.

pub mod session;
pub mod sse;
pub mod stdio;

pub use session::McpSession;
pub use sse::{SseServerHandle, start_sse_server};
pub use stdio::run_stdio_session;
