//! Run-scoped aggregation of recoverable failures.
//!
//! Every stage holds a clone of the same [`UnreachableReport`] handle and
//! appends to it; the collector flushes it to the error sink once, after all
//! stages have terminated.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::types::{CollectionRun, ExpirationDate, Ticker};

/// Placeholder key and expiration for failures not tied to a ticker or date
pub const NONE_KEY: &str = "NONE";

/// Key under which persistence failures are recorded
pub const STORE_KEY: &str = "DYNAMODB";

/// One recorded failure: the expiration label (or `"NONE"`) and the reason
pub type Entry = (String, String);

struct Inner {
    run: CollectionRun,
    entries: Mutex<BTreeMap<String, Vec<Entry>>>,
    flushed: AtomicBool,
}

/// Mapping from ticker (or a system key) to the failures recorded for it
///
/// Cloning yields another handle to the same report.
#[derive(Clone)]
pub struct UnreachableReport {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for UnreachableReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnreachableReport")
            .field("run", &self.inner.run)
            .field("keys", &self.keys())
            .finish()
    }
}

impl UnreachableReport {
    /// Create an empty report for `run`
    pub fn new(run: CollectionRun) -> Self {
        Self {
            inner: Arc::new(Inner {
                run,
                entries: Mutex::new(BTreeMap::new()),
                flushed: AtomicBool::new(false),
            }),
        }
    }

    /// The run this report belongs to
    pub fn run(&self) -> CollectionRun {
        self.inner.run
    }

    /// Append a failure under an arbitrary key
    pub fn record(&self, key: &str, expiration: &str, reason: impl std::fmt::Display) {
        let reason = reason.to_string();
        tracing::warn!(key, expiration, reason = %reason, "unreachable");
        let mut entries = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .entry(key.to_string())
            .or_default()
            .push((expiration.to_string(), reason));
    }

    /// Failure of one (ticker, expiration) work item
    pub fn record_item(
        &self,
        ticker: &Ticker,
        expiration: &ExpirationDate,
        reason: impl std::fmt::Display,
    ) {
        self.record(ticker.as_str(), &expiration.to_string(), reason);
    }

    /// Failure of a whole ticker
    pub fn record_ticker(&self, ticker: &Ticker, reason: impl std::fmt::Display) {
        self.record(ticker.as_str(), NONE_KEY, reason);
    }

    /// System-level failure (registry lookup, invalid invocation)
    pub fn record_system(&self, reason: impl std::fmt::Display) {
        self.record(NONE_KEY, NONE_KEY, reason);
    }

    /// Batched write failure
    pub fn record_store(&self, reason: impl std::fmt::Display) {
        self.record(STORE_KEY, NONE_KEY, reason);
    }

    /// Entries recorded under `key`, in insertion order
    pub fn entries(&self, key: &str) -> Vec<Entry> {
        let entries = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(key).cloned().unwrap_or_default()
    }

    /// Keys with at least one entry
    pub fn keys(&self) -> Vec<String> {
        let entries = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.keys().cloned().collect()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Render the sink message: `run_timestamp` beside one array of
    /// `[expiration, reason]` pairs per key
    pub fn to_message(&self) -> Value {
        let entries = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut message = Map::new();
        message.insert("run_timestamp".to_string(), Value::from(self.inner.run.0));
        for (key, list) in entries.iter() {
            let pairs = list
                .iter()
                .map(|(expiration, reason)| {
                    Value::Array(vec![
                        Value::String(expiration.clone()),
                        Value::String(reason.clone()),
                    ])
                })
                .collect();
            message.insert(key.clone(), Value::Array(pairs));
        }
        Value::Object(message)
    }

    /// Take the sink message, once
    ///
    /// Returns `None` on every call after the first.
    pub fn take_message(&self) -> Option<Value> {
        if self.inner.flushed.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(self.to_message())
    }
}
