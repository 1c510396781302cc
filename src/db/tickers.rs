//! Ticker registry: which symbols are collected.
//!
//! An active entry has `collecting = 'TRUE'`. Removing a ticker that already
//! has collected data rekeys its entry to an opaque id so the history stays
//! attributable; a ticker without data is deleted outright.

use rand::Rng;

use crate::error::DatabaseError;
use crate::types::Ticker;
use crate::{Error, Result};

use super::{COLLECTING_ACTIVE, Database, TickerEntry};

impl Database {
    /// Add `ticker` to the collection set
    ///
    /// Returns false if it was already being collected.
    pub async fn add_ticker(&self, ticker: &Ticker) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO tickers (ticker, collecting) VALUES (?, ?)
            ON CONFLICT(ticker, collecting) DO NOTHING
            "#,
        )
        .bind(ticker.as_str())
        .bind(COLLECTING_ACTIVE)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to add ticker: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove `ticker` from the collection set
    ///
    /// Returns false if it was not being collected.
    pub async fn stop_collecting(&self, ticker: &Ticker) -> Result<bool> {
        let query = if self.count_records(ticker).await? == 0 {
            sqlx::query("DELETE FROM tickers WHERE ticker = ? AND collecting = ?")
                .bind(ticker.as_str())
                .bind(COLLECTING_ACTIVE)
        } else {
            sqlx::query("UPDATE tickers SET collecting = ? WHERE ticker = ? AND collecting = ?")
                .bind(opaque_id())
                .bind(ticker.as_str())
                .bind(COLLECTING_ACTIVE)
        };

        let result = query.execute(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to stop collecting ticker: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Symbols actively collected, alphabetically
    pub async fn collecting_tickers(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT ticker FROM tickers WHERE collecting = ? ORDER BY ticker")
            .bind(COLLECTING_ACTIVE)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to query collecting tickers: {}",
                    e
                )))
            })
    }

    /// Every registry entry for `ticker`, active or retired
    pub async fn ticker_entries(&self, ticker: &Ticker) -> Result<Vec<TickerEntry>> {
        sqlx::query_as::<_, TickerEntry>(
            r#"
            SELECT ticker, collecting, starting, ending, errors, err_emavg,
                   flag_state, flag_reason, last_timestamp
            FROM tickers WHERE ticker = ?
            "#,
        )
        .bind(ticker.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query ticker entries: {}",
                e
            )))
        })
    }
}

/// 32 hex digits
fn opaque_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().r#gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
