//! Stage 1: feed the ticker backlog into the pipeline under the time budget.

use std::collections::VecDeque;
use std::time::Duration;

use super::Message;
use super::queue::StageQueue;
use crate::host::{ContinuationScheduler, InvocationContext};
use crate::report::UnreachableReport;
use crate::types::{Invocation, Ticker};

/// What the intake stage did with its backlog
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntakeOutcome {
    /// Tickers pushed into the pipeline, in order
    pub dispatched: Vec<Ticker>,
    /// Tickers handed to a continuation because the budget ran low
    pub continued: Option<Vec<Ticker>>,
}

/// Dispatch tickers until the backlog empties or the remaining time drops
/// below `margin`
///
/// Checks the budget before every ticker. Once it is below the margin, the
/// unconsumed rest of the backlog goes to exactly one continuation carrying
/// the same run. Always ends by pushing the sentinel.
pub(super) async fn run(
    backlog: Vec<Ticker>,
    margin: Duration,
    context: &dyn InvocationContext,
    continuation: &dyn ContinuationScheduler,
    output: &StageQueue<Message<Ticker>>,
    report: &UnreachableReport,
) -> IntakeOutcome {
    let mut backlog: VecDeque<Ticker> = backlog.into();
    let mut outcome = IntakeOutcome::default();

    while !backlog.is_empty() {
        // Checked before every ticker; in-flight work is never cut short
        let remaining = context.remaining_time();
        if remaining < margin {
            let rest: Vec<Ticker> = backlog.drain(..).collect();
            tracing::info!(
                remaining_ms = remaining.as_millis() as u64,
                tickers_left = rest.len(),
                "time budget low, scheduling continuation"
            );
            schedule_continuation(&rest, continuation, report).await;
            outcome.continued = Some(rest);
            break;
        }

        let Some(ticker) = backlog.pop_front() else {
            break;
        };
        output.push(Message::Item(ticker.clone())).await;
        tracing::debug!(
            ticker = %ticker,
            queue = output.name(),
            len = output.len(),
            "ticker dispatched"
        );
        outcome.dispatched.push(ticker);
    }

    output.push(Message::Shutdown).await;
    tracing::debug!(stage = "intake", dispatched = outcome.dispatched.len(), "returning");
    outcome
}

async fn schedule_continuation(
    rest: &[Ticker],
    continuation: &dyn ContinuationScheduler,
    report: &UnreachableReport,
) {
    let invocation = Invocation::Continue {
        tickers: rest.iter().map(|t| t.as_str().to_string()).collect(),
        run: report.run(),
    };
    if let Err(e) = continuation.schedule(&invocation).await {
        tracing::error!(error = %e, tickers = rest.len(), "continuation failed");
        for ticker in rest {
            report.record_ticker(ticker, format!("Continuation Failed: {}", e));
        }
    }
}
