//! Error types for options-history
//!
//! This module provides the error hierarchy for the library:
//! - [`Error`], the top-level type returned by fallible operations
//! - Domain-specific error types for the database, scraping and encoding layers
//!
//! Nothing in the collection pipeline propagates these out of a run. Item-scoped
//! failures are rendered to strings and appended to the run's
//! [`UnreachableReport`](crate::report::UnreachableReport).

use thiserror::Error;

/// Result type alias for options-history operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for options-history
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "MAXCONNECTIONS")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The scraped page could not be used
    #[error("scrape error: {0}")]
    Scrape(#[from] ScrapeError),

    /// A table could not be encoded or decoded
    #[error("encoding error: {0}")]
    Encode(#[from] EncodeError),

    /// The invocation event was not understood
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),

    /// A ticker symbol failed validation
    #[error("invalid ticker: {0:?}")]
    InvalidTicker(String),

    /// The follow-up invocation could not be scheduled
    #[error("continuation error: {0}")]
    Continuation(String),

    /// The run report could not be delivered
    #[error("error sink error: {0}")]
    ErrorSink(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Errors raised while fetching or parsing a finance page
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// A table had no header row
    #[error("table has no header row")]
    MissingHeader,

    /// An expiration label was not a "Month DD, YYYY" date
    #[error("invalid expiration date {0:?}")]
    InvalidDate(String),
}

/// Errors raised while encoding or decoding an options table
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A required column was not present in the table
    #[error("missing column {0:?}")]
    MissingColumn(String),

    /// A cell could not be coerced to a number
    #[error("malformed cell {value:?} at row {row}, column {column:?}")]
    MalformedCell {
        /// Zero-based row index
        row: usize,
        /// Column label
        column: String,
        /// Raw cell text
        value: String,
    },

    /// A row had a different number of cells than the header
    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        /// Zero-based row index
        row: usize,
        /// Number of header columns
        expected: usize,
        /// Number of cells found
        found: usize,
    },

    /// Matrix length does not match the declared shape
    #[error("matrix holds {found} values, shape requires {expected}")]
    ShapeMismatch {
        /// `shape[0] * shape[1]`
        expected: usize,
        /// Values actually present
        found: usize,
    },

    /// Base64 payload could not be decoded
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Shape payload was not two non-negative int32 values
    #[error("invalid shape: {0}")]
    InvalidShape(String),
}
