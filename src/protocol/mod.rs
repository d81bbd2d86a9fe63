//! MCP protocol types and message definitions

pub mod methods;
pub mod types;
pub mod validation;

pub use types::*;
