//! Option record persistence.
//!
//! Records are append-only: a key is written once by the writer stage. A
//! repeated write under the same key replaces the row, so at-least-once
//! delivery is harmless.

use chrono::NaiveDate;

use crate::encoding::EncodedTable;
use crate::error::DatabaseError;
use crate::types::{CollectedExpirationKey, StoredRecord, Ticker};
use crate::{Error, Result};

use super::{Database, OptionRecordRow};

// 4 bind variables per record, SQLite's default limit is 999.
const MAX_RECORDS_PER_INSERT: usize = 249;

impl Database {
    /// Write a batch of records in one transaction
    pub async fn put_records(&self, records: &[StoredRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let rows = records
            .iter()
            .map(to_row)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin record batch: {}",
                e
            )))
        })?;

        for chunk in rows.chunks(MAX_RECORDS_PER_INSERT) {
            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT OR REPLACE INTO option_records (ticker, collected_expiration_key, calls, puts) ",
            );
            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.ticker)
                    .push_bind(&row.collected_expiration_key)
                    .push_bind(&row.calls)
                    .push_bind(&row.puts);
            });

            query_builder.build().execute(&mut *tx).await.map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert record batch: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit record batch: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Records for `ticker` collected on the UTC `day`, in key order
    pub async fn records_for_day(&self, ticker: &Ticker, day: NaiveDate) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query_as::<_, OptionRecordRow>(
            r#"
            SELECT ticker, collected_expiration_key, calls, puts
            FROM option_records
            WHERE ticker = ? AND collected_expiration_key >= ? AND collected_expiration_key < ?
            ORDER BY collected_expiration_key ASC
            "#,
        )
        .bind(ticker.as_str())
        .bind(CollectedExpirationKey::day_start(day).to_db_text())
        .bind(CollectedExpirationKey::day_end(day).to_db_text())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query records: {}",
                e
            )))
        })?;

        rows.iter().map(from_row).collect()
    }

    /// Number of records stored for `ticker`
    pub async fn count_records(&self, ticker: &Ticker) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM option_records WHERE ticker = ?")
            .bind(ticker.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count records: {}",
                    e
                )))
            })
    }
}

fn to_row(record: &StoredRecord) -> Result<OptionRecordRow> {
    Ok(OptionRecordRow {
        ticker: record.ticker.as_str().to_string(),
        collected_expiration_key: record.key.to_db_text(),
        calls: record.calls.as_ref().map(EncodedTable::to_json).transpose()?,
        puts: record.puts.as_ref().map(EncodedTable::to_json).transpose()?,
    })
}

fn from_row(row: &OptionRecordRow) -> Result<StoredRecord> {
    let key = CollectedExpirationKey::from_db_text(&row.collected_expiration_key).ok_or_else(|| {
        Error::Database(DatabaseError::QueryFailed(format!(
            "Malformed record key {:?}",
            row.collected_expiration_key
        )))
    })?;
    let decode = |doc: &Option<String>| doc.as_deref().map(EncodedTable::from_json).transpose();

    Ok(StoredRecord {
        ticker: Ticker::parse(&row.ticker)?,
        key,
        calls: decode(&row.calls)?,
        puts: decode(&row.puts)?,
    })
}
