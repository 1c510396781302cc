//! Stage 3: fetch the calls and puts tables of each work item.

use super::Message;
use super::queue::StageQueue;
use super::shutdown::ShutdownCoordinator;
use crate::encoding::RawChainTables;
use crate::report::UnreachableReport;
use crate::source::OptionsSource;
use crate::types::{Side, WorkItem};

/// Reason recorded when a page has neither table
pub const NO_DATA: &str = "No Data";

/// Raw tables of one work item, at least one side present
#[derive(Clone, Debug, PartialEq)]
pub struct FetchedChain {
    /// The work item the tables belong to
    pub item: WorkItem,
    /// Extracted tables
    pub tables: RawChainTables,
}

pub(super) async fn run(
    worker: usize,
    source: &dyn OptionsSource,
    input: &StageQueue<Message<WorkItem>>,
    output: &StageQueue<Message<FetchedChain>>,
    shutdown: &ShutdownCoordinator<'_, FetchedChain>,
    report: &UnreachableReport,
) {
    loop {
        match input.pop().await {
            Some(Message::Item(item)) => {
                fetch(item, source, output, report).await;
                input.task_done();
            }
            Some(Message::Shutdown) => {
                shutdown.observe_sentinel(input).await;
                break;
            }
            None => break,
        }
    }
    tracing::debug!(stage = "fetcher", worker, "returning");
}

async fn fetch(
    item: WorkItem,
    source: &dyn OptionsSource,
    output: &StageQueue<Message<FetchedChain>>,
    report: &UnreachableReport,
) {
    let tables = match source.chain_tables(&item).await {
        Ok(tables) => tables,
        Err(e) => {
            report.record_item(&item.ticker, &item.expiration, e);
            return;
        }
    };

    for side in [Side::Calls, Side::Puts] {
        if tables.side(side).is_none() {
            report.record_item(&item.ticker, &item.expiration, side.missing_reason());
        }
    }
    if tables.is_empty() {
        report.record_item(&item.ticker, &item.expiration, NO_DATA);
        return;
    }

    output.push(Message::Item(FetchedChain { item, tables })).await;
    tracing::debug!(queue = output.name(), len = output.len(), "chain fetched");
}
