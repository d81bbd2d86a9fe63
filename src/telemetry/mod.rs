//! Call logging and aggregated statistics
//!
//! Every tool invocation produces exactly one [`ToolCallLog`] entry, kept in
//! a bounded in-memory history, folded into [`StatsSnapshot`] counters, and
//! appended to a daily JSONL journal through a single-writer queue.

pub mod history;
pub mod stats;
pub mod store;

pub use history::{DEFAULT_HISTORY_CAPACITY, SubscriptionId, ToolCallLog};
pub use stats::{StatsSnapshot, ToolStat};
pub use store::TelemetryStore;
