//! Invocation entry point.
//!
//! [`Collector::handle`] turns one host event into one pipeline run:
//!
//! 1. interpret the event (`initialize` or `continue`)
//! 2. build the backlog from the ticker registry or the event itself
//! 3. run the [`Pipeline`] under the invocation's time budget
//! 4. send the run's [`UnreachableReport`] to the error sink, exactly once
//!
//! The host always gets status `0`; failures surface only through the report.

use std::sync::Arc;

use crate::config::Config;
use crate::db::{Database, RecordStore, TickerRegistry};
use crate::error::Result;
use crate::host::{
    ContinuationScheduler, ErrorSink, InvocationContext, continuation_from_config,
    error_sink_from_config,
};
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::report::UnreachableReport;
use crate::source::{HttpOptionsSource, OptionsSource};
use crate::types::{CollectionRun, Invocation, Ticker};

/// Status returned to the host for every invocation
pub const EXIT_OK: i32 = 0;

/// Collaborators shared by every invocation
pub struct Collector {
    config: Config,
    source: Arc<dyn OptionsSource>,
    store: Arc<dyn RecordStore>,
    registry: Arc<dyn TickerRegistry>,
    continuation: Arc<dyn ContinuationScheduler>,
    sink: Arc<dyn ErrorSink>,
}

impl Collector {
    /// Assemble a collector from explicit collaborators
    pub fn new(
        config: Config,
        source: Arc<dyn OptionsSource>,
        store: Arc<dyn RecordStore>,
        registry: Arc<dyn TickerRegistry>,
        continuation: Arc<dyn ContinuationScheduler>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            config,
            source,
            store,
            registry,
            continuation,
            sink,
        }
    }

    /// Production collector: HTTP source, SQLite store and registry, and
    /// the host endpoints named in `config`
    ///
    /// # Errors
    /// Returns error if the configuration is invalid, the HTTP client cannot
    /// be built or the database cannot be opened
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let source = HttpOptionsSource::new(&config.source, config.pipeline.max_connections)?;
        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        let continuation: Arc<dyn ContinuationScheduler> =
            Arc::from(continuation_from_config(&config.host));
        let sink: Arc<dyn ErrorSink> = Arc::from(error_sink_from_config(&config.host));

        Ok(Self::new(
            config,
            Arc::new(source),
            db.clone(),
            db,
            continuation,
            sink,
        ))
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle one host event
    pub async fn handle(&self, event: &serde_json::Value, context: &dyn InvocationContext) -> i32 {
        let invocation = Invocation::from_event(event);
        let run = match &invocation {
            Ok(Invocation::Continue { run, .. }) => *run,
            Ok(Invocation::Initialize) => CollectionRun::start(),
            // A rejected event still belongs to the run it names
            Err(_) => CollectionRun::from_event(event).unwrap_or_else(CollectionRun::start),
        };
        let report = UnreachableReport::new(run);

        let backlog = match invocation {
            Ok(Invocation::Initialize) => {
                tracing::info!(state = "initialize", run_timestamp = run.get(), "State: initialize");
                self.collection_set(&report).await
            }
            Ok(Invocation::Continue { tickers, .. }) => {
                tracing::info!(
                    state = "continue",
                    run_timestamp = run.get(),
                    tickers = tickers.len(),
                    "State: continue"
                );
                Some(validated(tickers, &report))
            }
            Err(e) => {
                tracing::error!(error = %e, "invalid invocation");
                report.record_system(e);
                None
            }
        };

        if let Some(backlog) = backlog {
            self.run_pipeline(backlog, context, &report).await;
        }

        tracing::info!(
            run_timestamp = run.get(),
            minutes = run.elapsed_minutes(chrono::Utc::now()),
            "Total minutes"
        );
        self.flush(&report).await;
        EXIT_OK
    }

    async fn collection_set(&self, report: &UnreachableReport) -> Option<Vec<Ticker>> {
        match self.registry.active_tickers().await {
            Ok(symbols) => {
                tracing::debug!(tickers = symbols.len(), "collection set loaded");
                Some(validated(symbols, report))
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load collection set");
                report.record_system(format!("Unable to get collection list: {}", e));
                None
            }
        }
    }

    async fn run_pipeline(
        &self,
        backlog: Vec<Ticker>,
        context: &dyn InvocationContext,
        report: &UnreachableReport,
    ) -> PipelineOutcome {
        let pipeline = Pipeline {
            config: &self.config.pipeline,
            source: self.source.as_ref(),
            store: self.store.as_ref(),
            continuation: self.continuation.as_ref(),
            context,
        };
        pipeline.run(backlog, report).await
    }

    async fn flush(&self, report: &UnreachableReport) {
        let Some(message) = report.take_message() else {
            return;
        };
        match self.sink.send(&message).await {
            Ok(()) => tracing::debug!(keys = report.keys().len(), "unreachable report sent"),
            Err(e) => tracing::error!(error = %e, "failed to send unreachable report"),
        }
    }
}

/// Parse symbols, recording rejected ones under the system key
fn validated(symbols: Vec<String>, report: &UnreachableReport) -> Vec<Ticker> {
    symbols
        .into_iter()
        .filter_map(|symbol| match Ticker::parse(&symbol) {
            Ok(ticker) => Some(ticker),
            Err(e) => {
                report.record_system(e);
                None
            }
        })
        .collect()
}
