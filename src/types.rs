//! Core types for options-history

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::encoding::EncodedTable;
use crate::error::{Error, Result, ScrapeError};

/// Display format of expiration dates on the finance site ("May 15, 2020")
pub const EXPIRATION_LABEL_FORMAT: &str = "%B %d, %Y";

/// Maximum length of a ticker symbol
pub const MAX_TICKER_LEN: usize = 8;

#[allow(clippy::expect_used)]
fn ticker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z.]+$").expect("ticker pattern is valid"))
}

/// A short uppercase ticker symbol, the unit of work entering the pipeline
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(String);

impl Ticker {
    /// Validate and wrap a symbol (`[A-Z.]+`, at most 8 characters)
    pub fn parse(symbol: &str) -> Result<Self> {
        if symbol.len() > MAX_TICKER_LEN || !ticker_pattern().is_match(symbol) {
            return Err(Error::InvalidTicker(symbol.to_string()));
        }
        Ok(Self(symbol.to_string()))
    }

    /// The symbol text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Ticker {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

const MIN_YEAR: i32 = 1;
const MAX_YEAR: i32 = 9999;

/// Calendar date of one options contract expiry
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpirationDate(NaiveDate);

impl ExpirationDate {
    /// Wrap a calendar date
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Parse a drop-down label such as "May 15, 2020"
    ///
    /// Only four-digit years are accepted; record keys reserve exactly four
    /// digits for the year.
    pub fn parse_label(label: &str) -> std::result::Result<Self, ScrapeError> {
        let date = NaiveDate::parse_from_str(label.trim(), EXPIRATION_LABEL_FORMAT)
            .map_err(|_| ScrapeError::InvalidDate(label.to_string()))?;
        if !(MIN_YEAR..=MAX_YEAR).contains(&date.year()) {
            return Err(ScrapeError::InvalidDate(label.to_string()));
        }
        Ok(Self(date))
    }

    /// The underlying date
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The date as the integer YYYYMMDD
    ///
    /// Years outside 1..=9999 are clamped so the result always has eight digits.
    pub fn yyyymmdd(&self) -> u32 {
        let year = self.0.year().clamp(MIN_YEAR, MAX_YEAR) as u32;
        year * 10_000 + self.0.month() * 100 + self.0.day()
    }

    /// Unix seconds at 00:00 UTC on this date, as the site's `date` query parameter
    pub fn unix_timestamp(&self) -> i64 {
        self.0.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
    }
}

impl std::fmt::Display for ExpirationDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(EXPIRATION_LABEL_FORMAT))
    }
}

/// Identity of a logical collection run, carried through every continuation
///
/// The value is the Unix time in nanoseconds at which the run was initialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionRun(pub u64);

impl CollectionRun {
    /// Start a fresh run stamped with the current time
    pub fn start() -> Self {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Self(u64::try_from(nanos).unwrap_or_default())
    }

    /// Run named by a host event's `run_timestamp` (or `runTimestamp`), if any
    ///
    /// Used to keep the report of a malformed event attached to its run.
    pub fn from_event(event: &serde_json::Value) -> Option<Self> {
        ["run_timestamp", "runTimestamp"]
            .iter()
            .find_map(|field| event.get(field).and_then(serde_json::Value::as_u64))
            .map(Self)
    }

    /// Get the inner nanosecond value
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Minutes elapsed between the run start and `now`
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> f64 {
        let now_nanos = now.timestamp_nanos_opt().unwrap_or_default() as f64;
        (now_nanos - self.0 as f64) * 1e-9 / 60.0
    }
}

impl std::fmt::Display for CollectionRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A (ticker, expiration) pair, the unit of work for stages 3-5
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkItem {
    /// Ticker symbol
    pub ticker: Ticker,
    /// Contract expiry
    pub expiration: ExpirationDate,
}

fn collection_stamp(collected: NaiveDateTime) -> u128 {
    collected.year() as u128 * 10_000_000_000
        + collected.month() as u128 * 100_000_000
        + collected.day() as u128 * 1_000_000
        + collected.hour() as u128 * 10_000
        + collected.minute() as u128 * 100
        + collected.second() as u128
}

/// Sort key of a stored record: `YYYYMMDDHHMMSS` of collection followed by
/// `YYYYMMDD` of expiration, as one 22-digit integer
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectedExpirationKey(pub u128);

impl CollectedExpirationKey {
    /// Number of decimal digits in a key
    pub const WIDTH: usize = 22;

    /// Build the key for an expiration collected at `collected`
    pub fn new(collected: NaiveDateTime, expiration: ExpirationDate) -> Self {
        Self(collection_stamp(collected) * 100_000_000 + expiration.yyyymmdd() as u128)
    }

    /// The smallest key collected on `day` (for range queries)
    pub fn day_start(day: NaiveDate) -> Self {
        Self(collection_stamp(day.and_time(chrono::NaiveTime::MIN)) * 100_000_000)
    }

    /// The smallest key collected after `day`
    pub fn day_end(day: NaiveDate) -> Self {
        let next = day.succ_opt().unwrap_or(day);
        Self::day_start(next)
    }

    /// When the record was collected
    pub fn collected_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.to_db_text()[..14], "%Y%m%d%H%M%S").ok()
    }

    /// The expiration date encoded in the key
    pub fn expiration(&self) -> Option<ExpirationDate> {
        NaiveDate::parse_from_str(&self.to_db_text()[14..], "%Y%m%d")
            .ok()
            .map(ExpirationDate)
    }

    /// Fixed-width decimal text, ordered the same as the integer
    pub fn to_db_text(&self) -> String {
        format!("{:0width$}", self.0, width = Self::WIDTH)
    }

    /// Parse the fixed-width decimal form
    pub fn from_db_text(text: &str) -> Option<Self> {
        text.parse().ok().map(Self)
    }
}

impl std::fmt::Display for CollectedExpirationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the chain a table holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Call contracts
    Calls,
    /// Put contracts
    Puts,
}

impl Side {
    /// Reason recorded when this side is absent from a page
    pub fn missing_reason(&self) -> &'static str {
        match self {
            Side::Calls => "No Calls Data",
            Side::Puts => "No Puts Data",
        }
    }
}

/// One persisted options snapshot for a (ticker, expiration)
///
/// Created once by the writer stage and never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredRecord {
    /// Partition key
    pub ticker: Ticker,
    /// Sort key
    pub key: CollectedExpirationKey,
    /// Encoded calls table, if the page had one
    pub calls: Option<EncodedTable>,
    /// Encoded puts table, if the page had one
    pub puts: Option<EncodedTable>,
}

/// The event that starts an invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invocation {
    /// Look up the active ticker set and start a fresh run
    Initialize,
    /// Resume an existing run with exactly these tickers
    Continue {
        /// Remaining ticker symbols
        tickers: Vec<String>,
        /// Identity of the run being resumed
        run: CollectionRun,
    },
}

#[derive(Debug, Default, Deserialize)]
struct RawInvocation {
    #[serde(rename = "State", alias = "state")]
    state: Option<String>,
    #[serde(rename = "Tickers", alias = "tickers")]
    tickers: Option<Vec<String>>,
    #[serde(rename = "run_timestamp", alias = "runTimestamp")]
    run_timestamp: Option<u64>,
}

#[derive(Serialize)]
struct ContinuePayload<'a> {
    #[serde(rename = "State")]
    state: &'static str,
    #[serde(rename = "Tickers")]
    tickers: &'a [String],
    run_timestamp: u64,
}

impl Invocation {
    /// Interpret a host event
    ///
    /// `State` must be `"initialize"` or `"continue"`; a continue event must
    /// carry both `Tickers` and `run_timestamp`.
    pub fn from_event(event: &serde_json::Value) -> Result<Self> {
        let raw: RawInvocation = serde_json::from_value(event.clone())
            .map_err(|e| Error::InvalidInvocation(format!("malformed event: {}", e)))?;

        match raw.state.as_deref() {
            Some("initialize") => Ok(Invocation::Initialize),
            Some("continue") => {
                let tickers = raw.tickers.ok_or_else(|| {
                    Error::InvalidInvocation("continue event without Tickers".to_string())
                })?;
                let run = raw.run_timestamp.ok_or_else(|| {
                    Error::InvalidInvocation("continue event without run_timestamp".to_string())
                })?;
                Ok(Invocation::Continue {
                    tickers,
                    run: CollectionRun(run),
                })
            }
            Some(other) => Err(Error::InvalidInvocation(format!(
                "received invalid State {:?}",
                other
            ))),
            None => Err(Error::InvalidInvocation("event has no State".to_string())),
        }
    }

    /// Render as a host event
    pub fn to_event(&self) -> serde_json::Value {
        match self {
            Invocation::Initialize => serde_json::json!({ "State": "initialize" }),
            Invocation::Continue { tickers, run } => serde_json::to_value(ContinuePayload {
                state: "continue",
                tickers,
                run_timestamp: run.0,
            })
            .unwrap_or(serde_json::Value::Null),
        }
    }
}
