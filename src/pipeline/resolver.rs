//! Stage 2: expand each ticker into one work item per listed expiration.

use super::Message;
use super::queue::StageQueue;
use super::shutdown::ShutdownCoordinator;
use crate::report::UnreachableReport;
use crate::source::OptionsSource;
use crate::types::{ExpirationDate, Ticker, WorkItem};

/// Reason recorded for a ticker whose listing offers no usable expiration
pub const NO_EXPIRATION_DATES: &str = "No Expiration Dates";

pub(super) async fn run(
    worker: usize,
    source: &dyn OptionsSource,
    input: &StageQueue<Message<Ticker>>,
    output: &StageQueue<Message<WorkItem>>,
    shutdown: &ShutdownCoordinator<'_, WorkItem>,
    report: &UnreachableReport,
) {
    loop {
        match input.pop().await {
            Some(Message::Item(ticker)) => {
                resolve(&ticker, source, output, report).await;
                input.task_done();
            }
            Some(Message::Shutdown) => {
                shutdown.observe_sentinel(input).await;
                break;
            }
            None => break,
        }
    }
    tracing::debug!(stage = "resolver", worker, "returning");
}

async fn resolve(
    ticker: &Ticker,
    source: &dyn OptionsSource,
    output: &StageQueue<Message<WorkItem>>,
    report: &UnreachableReport,
) {
    let labels = match source.expiration_labels(ticker).await {
        Ok(labels) => labels,
        Err(e) => {
            tracing::error!(ticker = %ticker, error = %e, "failed to fetch expiration listing");
            report.record_ticker(ticker, e);
            return;
        }
    };

    let mut expirations = Vec::with_capacity(labels.len());
    for label in &labels {
        match ExpirationDate::parse_label(label) {
            Ok(date) => expirations.push(date),
            Err(_) => report.record(
                ticker.as_str(),
                label,
                format!("Invalid Expiration Date {:?}", label),
            ),
        }
    }

    if expirations.is_empty() {
        report.record_ticker(ticker, NO_EXPIRATION_DATES);
        return;
    }

    for expiration in expirations {
        output
            .push(Message::Item(WorkItem {
                ticker: ticker.clone(),
                expiration,
            }))
            .await;
    }
    tracing::debug!(
        ticker = %ticker,
        expirations = labels.len(),
        queue = output.name(),
        len = output.len(),
        "expirations resolved"
    );
}
