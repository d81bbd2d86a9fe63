//! In-memory tool-call history
//!
//! A bounded circular buffer of call log entries with synchronous
//! subscribers. The buffer drops the oldest entry once capacity is exceeded;
//! subscribers are delivered each new entry as it is appended and a panicking
//! subscriber never affects the caller or the other subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Default number of retained call log entries
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// One recorded tool invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallLog {
    /// Moment the call completed
    pub timestamp: DateTime<Utc>,
    /// Caller identity ("cli", "stdio", or an SSE session id)
    pub client_id: String,
    /// Fully-qualified tool name
    pub tool: String,
    /// Arguments as received
    pub params: Value,
    /// Whether the handler returned (vs. threw or was never found)
    pub success: bool,
    /// Error text for failed calls
    pub error: Option<String>,
    /// Handler wall time in milliseconds
    pub duration_ms: u64,
    /// UTF-8 length of the serialized request parameters
    pub request_bytes: u64,
    /// UTF-8 length of the text returned to the peer
    pub response_bytes: u64,
}

/// Handle returned by [`CallHistory::subscribe`], used to detach again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn Fn(&ToolCallLog) + Send + Sync>;

/// Bounded circular call history with synchronous subscribers
pub struct CallHistory {
    capacity: usize,
    entries: Mutex<VecDeque<ToolCallLog>>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
}

impl CallHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, evicting the oldest while over capacity
    pub fn push(&self, entry: ToolCallLog) {
        {
            let mut entries = self.entries.lock().expect("history lock poisoned");
            entries.push_back(entry.clone());
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }

        let subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        for (id, subscriber) in subscribers.iter() {
            if catch_unwind(AssertUnwindSafe(|| subscriber(&entry))).is_err() {
                warn!(subscription = id.0, "telemetry subscriber panicked");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("history lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most recent `count` entries, oldest first
    pub fn recent(&self, count: usize) -> Vec<ToolCallLog> {
        let entries = self.entries.lock().expect("history lock poisoned");
        let skip = entries.len().saturating_sub(count);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.lock().expect("history lock poisoned").clear();
    }

    /// Attach a subscriber invoked synchronously for each new entry
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&ToolCallLog) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .retain(|(existing, _)| *existing != id);
    }
}
