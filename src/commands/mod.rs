//! CLI verb registry, built-ins, and the interactive shell core

pub mod builtins;
pub mod registry;
pub mod shell;

pub use registry::{BUILTINS, BuiltinSpec, CommandRegistry, Resolution, find_builtin};
pub use shell::{Shell, format_log_entry};
