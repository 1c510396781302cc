//! # options-history
//!
//! Time-budgeted collection of options-chain snapshots.
//!
//! Each invocation walks a backlog of tickers through a five-stage pipeline
//! (listing → expirations → chain tables → encoding → batched writes) and
//! stores one compact record per (ticker, expiration). When the host's time
//! budget runs low the unprocessed backlog is handed to a continuation that
//! resumes the same run.
//!
//! ## Design Philosophy
//!
//! - **Never abort a run** - every failure is recorded and the pipeline keeps going
//! - **One report per invocation** - failures surface once, at the end, through the error sink
//! - **Seams as traits** - the site, the store, the registry and the host are all swappable
//!
//! ## Quick Start
//!
//! ```no_run
//! use options_history::{Collector, Config, DeadlineContext};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let collector = Collector::from_config(Config::from_env()?).await?;
//!     let context = DeadlineContext::new(Duration::from_secs(900));
//!
//!     let status = collector
//!         .handle(&serde_json::json!({ "State": "initialize" }), &context)
//!         .await;
//!     assert_eq!(status, 0);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Invocation entry point
pub mod collector;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Table encoding for storage
pub mod encoding;
/// Error types
pub mod error;
/// Invoking-host collaborators
pub mod host;
/// Five-stage collection pipeline
pub mod pipeline;
/// Run-scoped failure report
pub mod report;
/// Finance-site access
pub mod source;
/// Core domain types
pub mod types;

// Re-export commonly used types
pub use collector::Collector;
pub use config::Config;
pub use db::{Database, RecordStore, TickerRegistry};
pub use encoding::{DecodedTable, EncodedTable, RawChainTables, RawTable};
pub use error::{Error, Result};
pub use host::{ContinuationScheduler, DeadlineContext, ErrorSink, InvocationContext};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use report::UnreachableReport;
pub use source::{HttpOptionsSource, OptionsSource};
pub use types::{
    CollectedExpirationKey, CollectionRun, ExpirationDate, Invocation, StoredRecord, Ticker,
    WorkItem,
};
