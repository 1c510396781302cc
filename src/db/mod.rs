//! Database layer for options-history
//!
//! Handles SQLite persistence for collected option records and the ticker
//! registry.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`records`]: Append-only option snapshots keyed by (ticker, collected-expiration key)
//! - [`tickers`]: Registry of tickers and their collecting state

use sqlx::{FromRow, sqlite::SqlitePool};

use crate::error::Result;
use crate::types::StoredRecord;

mod migrations;
mod records;
mod tickers;

/// Registry sort-key value of a ticker that is actively collected
pub const COLLECTING_ACTIVE: &str = "TRUE";

/// Option record row from database
#[derive(Debug, Clone, FromRow)]
pub struct OptionRecordRow {
    /// Partition key
    pub ticker: String,
    /// Fixed-width decimal collected-expiration key
    pub collected_expiration_key: String,
    /// Encoded calls document (JSON)
    pub calls: Option<String>,
    /// Encoded puts document (JSON)
    pub puts: Option<String>,
}

/// Ticker registry row from database
#[derive(Debug, Clone, FromRow)]
pub struct TickerEntry {
    /// Ticker symbol
    pub ticker: String,
    /// `"TRUE"` while collecting, an opaque id after removal
    pub collecting: String,
    /// First day with collected data (maintained externally)
    pub starting: Option<String>,
    /// Last day with collected data (maintained externally)
    pub ending: Option<String>,
    /// Error count (maintained by the log monitor)
    pub errors: i64,
    /// Exponential moving average of the error rate (maintained by the log monitor)
    pub err_emavg: Option<f64>,
    /// Alert flag state (maintained by the log monitor)
    pub flag_state: Option<String>,
    /// Alert flag reason (maintained by the log monitor)
    pub flag_reason: Option<String>,
    /// Last processed log timestamp (maintained by the log monitor)
    pub last_timestamp: Option<i64>,
}

/// SQLite-backed record store and ticker registry
pub struct Database {
    pool: SqlitePool,
}

/// Destination of the writer stage's batches
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a batch; either every record is written or none is
    async fn put_batch(&self, records: &[StoredRecord]) -> Result<()>;
}

/// Source of the active collection set
#[async_trait::async_trait]
pub trait TickerRegistry: Send + Sync {
    /// Symbols whose registry entry is actively collecting
    async fn active_tickers(&self) -> Result<Vec<String>>;
}

#[async_trait::async_trait]
impl RecordStore for Database {
    async fn put_batch(&self, records: &[StoredRecord]) -> Result<()> {
        self.put_records(records).await
    }
}

#[async_trait::async_trait]
impl TickerRegistry for Database {
    async fn active_tickers(&self) -> Result<Vec<String>> {
        self.collecting_tickers().await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
