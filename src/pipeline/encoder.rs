//! Stage 4: turn fetched tables into storable records.

use chrono::NaiveDateTime;

use super::Message;
use super::fetcher::FetchedChain;
use super::queue::StageQueue;
use super::shutdown::ShutdownCoordinator;
use crate::encoding::EncodedTable;
use crate::error::EncodeError;
use crate::report::UnreachableReport;
use crate::types::{CollectedExpirationKey, StoredRecord};

/// Build the record for `chain` as collected at `collected` (UTC)
pub fn encode_record(
    chain: &FetchedChain,
    collected: NaiveDateTime,
) -> Result<StoredRecord, EncodeError> {
    let calls = chain.tables.calls.as_ref().map(EncodedTable::encode).transpose()?;
    let puts = chain.tables.puts.as_ref().map(EncodedTable::encode).transpose()?;
    Ok(StoredRecord {
        ticker: chain.item.ticker.clone(),
        key: CollectedExpirationKey::new(collected, chain.item.expiration),
        calls,
        puts,
    })
}

pub(super) async fn run(
    input: &StageQueue<Message<FetchedChain>>,
    output: &StageQueue<Message<StoredRecord>>,
    shutdown: &ShutdownCoordinator<'_, StoredRecord>,
    report: &UnreachableReport,
) {
    loop {
        match input.pop().await {
            Some(Message::Item(chain)) => {
                match encode_record(&chain, chrono::Utc::now().naive_utc()) {
                    Ok(record) => {
                        output.push(Message::Item(record)).await;
                        tracing::debug!(queue = output.name(), len = output.len(), "record encoded");
                    }
                    Err(e) => report.record_item(
                        &chain.item.ticker,
                        &chain.item.expiration,
                        crate::Error::from(e),
                    ),
                }
                input.task_done();
            }
            Some(Message::Shutdown) => {
                shutdown.observe_sentinel(input).await;
                break;
            }
            None => break,
        }
    }
    tracing::debug!(stage = "encoder", "returning");
}
