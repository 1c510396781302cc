//! Five-stage collection pipeline.
//!
//! ```text
//! intake ─▶ Q1 ─▶ resolvers ─▶ Q2 ─▶ fetchers ─▶ Q3 ─▶ encoder ─▶ Q4 ─▶ writers
//! ```
//!
//! Every stage runs as a pool of cooperative workers on the current task.
//! The only cross-stage signal is [`Message::Shutdown`]: the intake stage
//! pushes one when it is done, and each pool forwards exactly one more after
//! all of its accepted work has been handed on (see [`ShutdownCoordinator`]).
//! [`Pipeline::run`] returns once every worker of every pool has exited.

mod encoder;
mod fetcher;
mod intake;
pub mod queue;
mod resolver;
pub mod shutdown;
mod writer;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicUsize, Ordering};

pub use encoder::encode_record;
pub use fetcher::{FetchedChain, NO_DATA};
pub use intake::IntakeOutcome;
pub use queue::StageQueue;
pub use resolver::NO_EXPIRATION_DATES;
pub use shutdown::ShutdownCoordinator;

use crate::config::PipelineConfig;
use crate::db::RecordStore;
use crate::host::{ContinuationScheduler, InvocationContext};
use crate::report::UnreachableReport;
use crate::types::{StoredRecord, Ticker, WorkItem};

/// Value carried by a stage queue
#[derive(Clone, Debug, PartialEq)]
pub enum Message<T> {
    /// A unit of work
    Item(T),
    /// No more work will follow from upstream
    Shutdown,
}

/// Result of one pipeline run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Tickers that entered the pipeline
    pub dispatched: Vec<Ticker>,
    /// Tickers deferred to a continuation
    pub continued: Option<Vec<Ticker>>,
    /// Records persisted by the writer stage
    pub records_written: usize,
}

/// Collaborators of one pipeline run
pub struct Pipeline<'a> {
    /// Pool sizes and the time budget
    pub config: &'a PipelineConfig,
    /// Page fetching for stages 2 and 3
    pub source: &'a dyn crate::source::OptionsSource,
    /// Destination of stage 5
    pub store: &'a dyn RecordStore,
    /// Receives the backlog remainder when time runs low
    pub continuation: &'a dyn ContinuationScheduler,
    /// Remaining execution time
    pub context: &'a dyn InvocationContext,
}

impl Pipeline<'_> {
    /// Drive `backlog` through every stage, recording failures in `report`
    pub async fn run(&self, backlog: Vec<Ticker>, report: &UnreachableReport) -> PipelineOutcome {
        let config = self.config;
        let tickers: StageQueue<Message<Ticker>> =
            StageQueue::new("Q1", config.ticker_queue_capacity());
        let items: StageQueue<Message<WorkItem>> =
            StageQueue::new("Q2", config.item_queue_capacity());
        let chains: StageQueue<Message<FetchedChain>> =
            StageQueue::new("Q3", config.item_queue_capacity());
        let records: StageQueue<Message<StoredRecord>> =
            StageQueue::new("Q4", config.item_queue_capacity());
        let (tickers, items, chains, records) = (&tickers, &items, &chains, &records);

        let resolver_shutdown = ShutdownCoordinator::new("resolver", items);
        let fetcher_shutdown = ShutdownCoordinator::new("fetcher", chains);
        let encoder_shutdown = ShutdownCoordinator::new("encoder", records);
        let writer_shutdown = ShutdownCoordinator::<()>::terminal("writer");
        let written = AtomicUsize::new(0);
        let (resolver_shutdown, fetcher_shutdown, writer_shutdown, written) =
            (&resolver_shutdown, &fetcher_shutdown, &writer_shutdown, &written);

        tracing::info!(
            tickers = backlog.len(),
            resolvers = config.resolver_workers,
            fetchers = config.max_connections,
            writers = config.writer_workers,
            "starting pipeline"
        );

        let intake = intake::run(
            backlog,
            config.time_safety_margin,
            self.context,
            self.continuation,
            tickers,
            report,
        );
        let resolvers = futures::future::join_all((0..config.resolver_workers).map(move |worker| {
            resolver::run(worker, self.source, tickers, items, resolver_shutdown, report)
        }));
        let fetchers = futures::future::join_all((0..config.max_connections).map(move |worker| {
            fetcher::run(worker, self.source, items, chains, fetcher_shutdown, report)
        }));
        let encoder = encoder::run(chains, records, &encoder_shutdown, report);
        let writers = futures::future::join_all((0..config.writer_workers).map(move |worker| {
            writer::run(worker, self.store, records, writer_shutdown, written, report)
        }));

        let (intake, _, _, _, _) = futures::join!(intake, resolvers, fetchers, encoder, writers);

        let outcome = PipelineOutcome {
            dispatched: intake.dispatched,
            continued: intake.continued,
            records_written: written.load(Ordering::SeqCst),
        };
        tracing::info!(
            dispatched = outcome.dispatched.len(),
            continued = outcome.continued.as_ref().map_or(0, Vec::len),
            records = outcome.records_written,
            "pipeline finished"
        );
        outcome
    }
}
