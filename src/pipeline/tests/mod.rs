//! In-memory collaborators for pipeline tests.

mod runs;

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::db::RecordStore;
use crate::encoding::{RawChainTables, RawTable};
use crate::error::{DatabaseError, Error, Result, ScrapeError};
use crate::host::{ContinuationScheduler, InvocationContext};
use crate::source::OptionsSource;
use crate::types::{Invocation, StoredRecord, Ticker, WorkItem};

pub(super) fn table(rows: &[(&str, &str)]) -> RawTable {
    RawTable {
        columns: vec!["Last Trade Date".to_string(), "Strike".to_string()],
        rows: rows
            .iter()
            .map(|(date, strike)| vec![date.to_string(), strike.to_string()])
            .collect(),
    }
}

pub(super) fn tickers(symbols: &[&str]) -> Vec<Ticker> {
    symbols.iter().map(|s| Ticker::parse(s).unwrap()).collect()
}

/// Finance site serving canned listings and chains
#[derive(Default)]
pub(super) struct FakeSource {
    listings: HashMap<String, Vec<String>>,
    chains: HashMap<(String, String), RawChainTables>,
    pub listing_calls: AtomicUsize,
}

impl FakeSource {
    pub fn listing(mut self, ticker: &str, labels: &[&str]) -> Self {
        self.listings
            .insert(ticker.to_string(), labels.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn chain(mut self, ticker: &str, label: &str, tables: RawChainTables) -> Self {
        self.chains
            .insert((ticker.to_string(), label.to_string()), tables);
        self
    }
}

#[async_trait::async_trait]
impl OptionsSource for FakeSource {
    async fn expiration_labels(&self, ticker: &Ticker) -> Result<Vec<String>> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.listings.get(ticker.as_str()).cloned().ok_or_else(|| {
            ScrapeError::HttpStatus {
                status: 404,
                url: format!("/quote/{}/options", ticker),
            }
            .into()
        })
    }

    async fn chain_tables(&self, item: &WorkItem) -> Result<RawChainTables> {
        tokio::task::yield_now().await;
        let key = (item.ticker.as_str().to_string(), item.expiration.to_string());
        self.chains.get(&key).cloned().ok_or_else(|| {
            ScrapeError::HttpStatus {
                status: 404,
                url: format!("/quote/{}/options?date={}", item.ticker, item.expiration.unix_timestamp()),
            }
            .into()
        })
    }
}

/// Record store keeping batches in memory
#[derive(Default)]
pub(super) struct MemoryStore {
    pub records: Mutex<Vec<StoredRecord>>,
    pub batches: AtomicUsize,
    pub fail: bool,
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn put_batch(&self, records: &[StoredRecord]) -> Result<()> {
        tokio::task::yield_now().await;
        self.batches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Database(DatabaseError::QueryFailed(
                "throughput exceeded".to_string(),
            )));
        }
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(())
    }
}

/// Context with plenty of time for the first `plenty_for` checks, then almost none
pub(super) struct ScriptedContext {
    checks: AtomicUsize,
    plenty_for: usize,
}

impl ScriptedContext {
    pub fn unlimited() -> Self {
        Self::running_low_after(usize::MAX)
    }

    pub fn running_low_after(plenty_for: usize) -> Self {
        Self {
            checks: AtomicUsize::new(0),
            plenty_for,
        }
    }
}

impl InvocationContext for ScriptedContext {
    fn remaining_time(&self) -> Duration {
        if self.checks.fetch_add(1, Ordering::SeqCst) < self.plenty_for {
            Duration::from_secs(900)
        } else {
            Duration::from_secs(100)
        }
    }
}

/// Continuation scheduler remembering what it was asked to schedule
#[derive(Default)]
pub(super) struct RecordingContinuation {
    pub scheduled: Mutex<Vec<Invocation>>,
    pub fail: bool,
}

#[async_trait::async_trait]
impl ContinuationScheduler for RecordingContinuation {
    async fn schedule(&self, invocation: &Invocation) -> Result<()> {
        self.scheduled.lock().unwrap().push(invocation.clone());
        if self.fail {
            return Err(Error::Continuation("queue unavailable".to_string()));
        }
        Ok(())
    }
}
