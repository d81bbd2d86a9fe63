//! Aggregated per-tool call statistics
//!
//! Counters accumulate per fully-qualified tool name plus a global total,
//! anchored to a stable `since` timestamp. The snapshot is what gets
//! persisted to `stats.json`; all counters advance monotonically until an
//! explicit reset restamps the origin.

use crate::telemetry::history::ToolCallLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counters for one tool (or the global totals)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolStat {
    pub calls: u64,
    pub success: u64,
    pub errors: u64,
    pub total_duration_ms: u64,
    pub total_request_bytes: u64,
    pub total_response_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

impl ToolStat {
    fn record(&mut self, entry: &ToolCallLog) {
        self.calls += 1;
        if entry.success {
            self.success += 1;
        } else {
            self.errors += 1;
        }
        self.total_duration_ms += entry.duration_ms;
        self.total_request_bytes += entry.request_bytes;
        self.total_response_bytes += entry.response_bytes;
        self.last_used = Some(entry.timestamp);
    }
}

/// The full statistics state as persisted to disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Origin of the aggregation window
    pub since: DateTime<Utc>,
    /// Counters across every tool
    pub totals: ToolStat,
    /// Per fully-qualified tool counters
    pub tools: BTreeMap<String, ToolStat>,
}

impl StatsSnapshot {
    pub fn new(since: DateTime<Utc>) -> Self {
        Self {
            since,
            totals: ToolStat::default(),
            tools: BTreeMap::new(),
        }
    }

    /// Fold one call log entry into the counters
    pub fn record(&mut self, entry: &ToolCallLog) {
        self.totals.record(entry);
        self.tools.entry(entry.tool.clone()).or_default().record(entry);
    }

    /// Drop all counters and restamp the origin
    pub fn reset(&mut self, now: DateTime<Utc>) {
        *self = Self::new(now);
    }
}
