//! Persistent telemetry store
//!
//! Combines the in-memory call history with two on-disk artifacts under the
//! state directory: an append-only daily journal (`logs/calls-YYYY-MM-DD.jsonl`)
//! and the aggregated `logs/stats.json`. All file writes funnel through one
//! writer task so journal lines never interleave and stats writes never
//! overlap; stats saves are debounced about a second behind the last update.
//! If the logs directory cannot be created the store degrades to in-memory
//! only and dispatch is unaffected.

use crate::telemetry::history::{CallHistory, SubscriptionId, ToolCallLog};
use crate::telemetry::stats::StatsSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Notify, mpsc, oneshot};
use tracing::{debug, warn};

/// Delay between the first stats update in a window and the save
const STATS_SAVE_DELAY: Duration = Duration::from_secs(1);

/// Journal record with the short keys used on disk
#[derive(Serialize)]
struct JournalRecord<'a> {
    ts: DateTime<Utc>,
    client: &'a str,
    tool: &'a str,
    params: &'a Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    err: Option<&'a str>,
    ms: u64,
    #[serde(rename = "reqBytes")]
    req_bytes: u64,
    #[serde(rename = "resBytes")]
    res_bytes: u64,
}

impl<'a> From<&'a ToolCallLog> for JournalRecord<'a> {
    fn from(entry: &'a ToolCallLog) -> Self {
        Self {
            ts: entry.timestamp,
            client: &entry.client_id,
            tool: &entry.tool,
            params: &entry.params,
            ok: entry.success,
            err: entry.error.as_deref(),
            ms: entry.duration_ms,
            req_bytes: entry.request_bytes,
            res_bytes: entry.response_bytes,
        }
    }
}

enum WriteJob {
    Append { path: PathBuf, line: String },
    Replace { path: PathBuf, contents: String },
    Flush(oneshot::Sender<()>),
}

/// Telemetry store: history, stats, and serialized persistence
pub struct TelemetryStore {
    history: CallHistory,
    stats: Mutex<StatsSnapshot>,
    logs_dir: PathBuf,
    /// `None` when persistence is degraded to in-memory only
    writer: Option<mpsc::UnboundedSender<WriteJob>>,
    stats_dirty: Arc<Notify>,
}

impl TelemetryStore {
    /// Create a store rooted at the given state directory
    ///
    /// The writer and debounce tasks run on the current tokio runtime.
    pub fn new(state_dir: &Path, capacity: usize) -> Arc<Self> {
        let logs_dir = state_dir.join("logs");

        let writer = match std::fs::create_dir_all(&logs_dir) {
            Ok(()) => {
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(run_writer(rx));
                Some(tx)
            }
            Err(err) => {
                warn!(
                    dir = %logs_dir.display(),
                    %err,
                    "cannot create logs directory, telemetry is in-memory only"
                );
                None
            }
        };

        let store = Arc::new(Self {
            history: CallHistory::new(capacity),
            stats: Mutex::new(StatsSnapshot::new(Utc::now())),
            logs_dir,
            writer,
            stats_dirty: Arc::new(Notify::new()),
        });

        if store.writer.is_some() {
            let weak = Arc::downgrade(&store);
            let dirty = store.stats_dirty.clone();
            tokio::spawn(async move {
                loop {
                    dirty.notified().await;
                    tokio::time::sleep(STATS_SAVE_DELAY).await;
                    match weak.upgrade() {
                        Some(store) => store.enqueue_stats_save(),
                        None => break,
                    }
                }
            });
        }

        store
    }

    /// Record one completed tool call
    ///
    /// Updates the stats, queues the journal append, then appends to the
    /// history (which delivers subscriber callbacks synchronously).
    pub fn record(&self, entry: ToolCallLog) {
        {
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            stats.record(&entry);
        }
        self.stats_dirty.notify_one();

        if let Some(writer) = &self.writer {
            let record = JournalRecord::from(&entry);
            match serde_json::to_string(&record) {
                Ok(line) => {
                    let path = self.journal_path(entry.timestamp);
                    let _ = writer.send(WriteJob::Append { path, line });
                }
                Err(err) => warn!(%err, "failed to serialize journal record"),
            }
        }

        self.history.push(entry);
    }

    /// Path of the daily journal file for the given moment
    pub fn journal_path(&self, when: DateTime<Utc>) -> PathBuf {
        self.logs_dir
            .join(format!("calls-{}.jsonl", when.format("%Y-%m-%d")))
    }

    /// Path of the persisted stats file
    pub fn stats_path(&self) -> PathBuf {
        self.logs_dir.join("stats.json")
    }

    /// Current statistics
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.lock().expect("stats lock poisoned").clone()
    }

    /// Drop all counters, restamp `since`, and persist immediately
    pub fn reset_stats(&self) {
        {
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            stats.reset(Utc::now());
        }
        self.enqueue_stats_save();
    }

    fn enqueue_stats_save(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let snapshot = self.stats();
        match serde_json::to_string_pretty(&snapshot) {
            Ok(contents) => {
                let _ = writer.send(WriteJob::Replace {
                    path: self.stats_path(),
                    contents,
                });
            }
            Err(err) => warn!(%err, "failed to serialize stats"),
        }
    }

    /// Persist pending state and wait for the write queue to drain
    pub async fn flush(&self) {
        self.enqueue_stats_save();
        if let Some(writer) = &self.writer {
            let (tx, rx) = oneshot::channel();
            if writer.send(WriteJob::Flush(tx)).is_ok() {
                let _ = rx.await;
            }
        }
    }

    // Accessors used by the shell and tests

    pub fn recent(&self, count: usize) -> Vec<ToolCallLog> {
        self.history.recent(count)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_capacity(&self) -> usize {
        self.history.capacity()
    }

    pub fn clear_history(&self) {
        self.history.clear();
    }

    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&ToolCallLog) + Send + Sync + 'static,
    {
        self.history.subscribe(subscriber)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.history.unsubscribe(id);
    }
}

async fn run_writer(mut rx: mpsc::UnboundedReceiver<WriteJob>) {
    while let Some(job) = rx.recv().await {
        match job {
            WriteJob::Append { path, line } => {
                let open = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await;
                match open {
                    Ok(mut file) => {
                        if let Err(err) = file.write_all(line.as_bytes()).await {
                            warn!(path = %path.display(), %err, "journal append failed");
                            continue;
                        }
                        if let Err(err) = file.write_all(b"\n").await {
                            warn!(path = %path.display(), %err, "journal append failed");
                        }
                    }
                    Err(err) => warn!(path = %path.display(), %err, "cannot open journal file"),
                }
            }
            WriteJob::Replace { path, contents } => {
                if let Err(err) = tokio::fs::write(&path, contents).await {
                    warn!(path = %path.display(), %err, "stats save failed");
                }
            }
            WriteJob::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("telemetry writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(tool: &str, success: bool) -> ToolCallLog {
        ToolCallLog {
            timestamp: Utc::now(),
            client_id: "cli".to_string(),
            tool: tool.to_string(),
            params: json!({"message": "hi"}),
            success,
            error: (!success).then(|| "boom".to_string()),
            duration_ms: 3,
            request_bytes: 16,
            response_bytes: 2,
        }
    }

    #[tokio::test]
    async fn test_journal_lines_are_individually_parseable() {
        let dir = tempfile::tempdir().unwrap();
        let store = TelemetryStore::new(dir.path(), 10);

        for i in 0..5 {
            store.record(entry(&format!("demo_t{i}"), i % 2 == 0));
        }
        store.flush().await;

        let contents = std::fs::read_to_string(store.journal_path(Utc::now())).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 5);
        for line in lines {
            let value: Value = serde_json::from_str(line).unwrap();
            assert!(value.get("ts").is_some());
            assert!(value.get("client").is_some());
            assert!(value.get("reqBytes").is_some());
        }
        // Failed calls carry the error, successful ones omit it
        let first: Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(first["ok"], true);
        assert!(first.get("err").is_none());
    }

    #[tokio::test]
    async fn test_history_bounded_while_stats_keep_counting() {
        let dir = tempfile::tempdir().unwrap();
        let store = TelemetryStore::new(dir.path(), 4);

        for _ in 0..10 {
            store.record(entry("demo_echo", true));
        }

        assert_eq!(store.history_len(), 4);
        let stats = store.stats();
        assert_eq!(stats.totals.calls, 10);
        assert_eq!(stats.totals.success, 10);
    }

    #[tokio::test]
    async fn test_stats_persisted_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let store = TelemetryStore::new(dir.path(), 10);

        store.record(entry("demo_echo", true));
        store.record(entry("demo_echo", false));
        store.flush().await;

        let contents = std::fs::read_to_string(store.stats_path()).unwrap();
        let value: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["totals"]["calls"], 2);
        assert_eq!(value["tools"]["demo_echo"]["errors"], 1);
    }

    #[tokio::test]
    async fn test_reset_stats_restamps_since() {
        let dir = tempfile::tempdir().unwrap();
        let store = TelemetryStore::new(dir.path(), 10);

        store.record(entry("demo_echo", true));
        let before = store.stats().since;
        store.reset_stats();
        let after = store.stats();
        assert_eq!(after.totals.calls, 0);
        assert!(after.since >= before);
    }

    #[tokio::test]
    async fn test_degraded_store_still_dispatches() {
        // A file where the state dir should be makes create_dir_all fail
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("state");
        std::fs::write(&blocked, b"not a directory").unwrap();

        let store = TelemetryStore::new(&blocked, 10);
        store.record(entry("demo_echo", true));
        store.flush().await;

        assert_eq!(store.history_len(), 1);
        assert_eq!(store.stats().totals.calls, 1);
    }
}
