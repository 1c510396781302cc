//! Stage 5: batch records into the store.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::Message;
use super::queue::StageQueue;
use super::shutdown::ShutdownCoordinator;
use crate::db::RecordStore;
use crate::report::UnreachableReport;
use crate::types::StoredRecord;

/// Drain whatever is queued into one batch
///
/// Blocks for a single value only when nothing is immediately available.
/// Returns the batch and whether the sentinel ended it.
async fn next_batch(input: &StageQueue<Message<StoredRecord>>) -> (Vec<StoredRecord>, bool) {
    let mut batch = Vec::new();
    // try_pop also yields None while the other writer is parked in pop();
    // that writer holds the receiver only when the queue is empty, so the
    // fallback below just parks behind it
    while let Some(message) = input.try_pop() {
        match message {
            Message::Item(record) => batch.push(record),
            Message::Shutdown => return (batch, true),
        }
    }
    if batch.is_empty() {
        match input.pop().await {
            Some(Message::Item(record)) => batch.push(record),
            Some(Message::Shutdown) | None => return (batch, true),
        }
    }
    (batch, false)
}

pub(super) async fn run(
    worker: usize,
    store: &dyn RecordStore,
    input: &StageQueue<Message<StoredRecord>>,
    shutdown: &ShutdownCoordinator<'_, ()>,
    written: &AtomicUsize,
    report: &UnreachableReport,
) {
    loop {
        let (batch, saw_sentinel) = next_batch(input).await;

        if !batch.is_empty() {
            tracing::debug!(worker, records = batch.len(), "writing batch");
            match store.put_batch(&batch).await {
                Ok(()) => {
                    written.fetch_add(batch.len(), Ordering::SeqCst);
                }
                Err(e) => {
                    tracing::error!(worker, records = batch.len(), error = %e, "batch write failed");
                    report.record_store(e);
                }
            }
            // Mark done only after the write so a peer's join covers the batch
            for _ in 0..batch.len() {
                input.task_done();
            }
        }

        if saw_sentinel {
            shutdown.observe_sentinel(input).await;
            break;
        }
    }
    tracing::debug!(stage = "writer", worker, "returning");
}
