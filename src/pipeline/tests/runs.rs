use std::sync::atomic::Ordering;

use chrono::NaiveDate;

use super::{FakeSource, MemoryStore, RecordingContinuation, ScriptedContext, table, tickers};
use crate::config::PipelineConfig;
use crate::encoding::RawChainTables;
use crate::pipeline::{FetchedChain, NO_DATA, NO_EXPIRATION_DATES, Pipeline, encode_record};
use crate::report::{NONE_KEY, STORE_KEY, UnreachableReport};
use crate::types::{CollectionRun, ExpirationDate, Invocation, Ticker, WorkItem};

fn small_config() -> PipelineConfig {
    PipelineConfig {
        resolver_workers: 3,
        ticker_queue_size: 2,
        max_connections: 4,
        writer_workers: 2,
        ..PipelineConfig::default()
    }
}

fn both_sides() -> RawChainTables {
    RawChainTables {
        calls: Some(table(&[("2020-05-01", "250"), ("2020-05-01", "255")])),
        puts: Some(table(&[("2020-05-01", "250")])),
    }
}

async fn run(
    config: &PipelineConfig,
    source: &FakeSource,
    store: &MemoryStore,
    context: &ScriptedContext,
    continuation: &RecordingContinuation,
    backlog: Vec<Ticker>,
) -> (crate::pipeline::PipelineOutcome, UnreachableReport) {
    let report = UnreachableReport::new(CollectionRun(42));
    let pipeline = Pipeline {
        config,
        source,
        store,
        continuation,
        context,
    };
    let outcome = pipeline.run(backlog, &report).await;
    (outcome, report)
}

#[tokio::test]
async fn test_collects_both_expirations_and_reports_missing_puts() {
    let source = FakeSource::default()
        .listing("AAPL", &["May 15, 2020", "May 22, 2020"])
        .chain("AAPL", "May 15, 2020", both_sides())
        .chain(
            "AAPL",
            "May 22, 2020",
            RawChainTables {
                calls: Some(table(&[("2020-05-01", "300")])),
                puts: None,
            },
        );
    let store = MemoryStore::default();
    let continuation = RecordingContinuation::default();

    let (outcome, report) = run(
        &small_config(),
        &source,
        &store,
        &ScriptedContext::unlimited(),
        &continuation,
        tickers(&["AAPL"]),
    )
    .await;

    assert_eq!(outcome.records_written, 2);
    assert!(outcome.continued.is_none());
    assert!(continuation.scheduled.lock().unwrap().is_empty());

    let mut records = store.records.lock().unwrap().clone();
    records.sort_by_key(|r| r.key.expiration());
    assert_eq!(records[0].key.expiration().unwrap().yyyymmdd(), 20200515);
    assert!(records[0].calls.is_some() && records[0].puts.is_some());
    assert_eq!(records[1].key.expiration().unwrap().yyyymmdd(), 20200522);
    assert!(records[1].puts.is_none());

    assert_eq!(report.keys(), vec!["AAPL"]);
    assert_eq!(
        report.entries("AAPL"),
        vec![("May 22, 2020".to_string(), "No Puts Data".to_string())]
    );
}

#[tokio::test]
async fn test_ticker_without_expirations_is_reported() {
    let source = FakeSource::default().listing("XFAIL", &[]);
    let store = MemoryStore::default();

    let (outcome, report) = run(
        &small_config(),
        &source,
        &store,
        &ScriptedContext::unlimited(),
        &RecordingContinuation::default(),
        tickers(&["XFAIL"]),
    )
    .await;

    assert_eq!(outcome.records_written, 0);
    assert_eq!(store.batches.load(Ordering::SeqCst), 0);
    assert_eq!(
        report.entries("XFAIL"),
        vec![(NONE_KEY.to_string(), NO_EXPIRATION_DATES.to_string())]
    );
}

#[tokio::test]
async fn test_unparseable_labels_and_fetch_failures_do_not_stop_the_run() {
    let source = FakeSource::default()
        .listing("MSFT", &["Someday", "May 15, 2020", "May 22, 2020"])
        .chain("MSFT", "May 15, 2020", RawChainTables::default())
        .listing("GE", &["May 15, 2020"])
        .chain("GE", "May 15, 2020", both_sides());
    let store = MemoryStore::default();

    let (outcome, report) = run(
        &small_config(),
        &source,
        &store,
        &ScriptedContext::unlimited(),
        &RecordingContinuation::default(),
        tickers(&["MSFT", "NOPE", "GE"]),
    )
    .await;

    assert_eq!(outcome.dispatched.len(), 3);
    assert_eq!(outcome.records_written, 1);

    let msft = report.entries("MSFT");
    assert!(msft[0].0 == "Someday" && msft[0].1.contains("Invalid Expiration Date"));
    let empty_page: Vec<&str> = msft
        .iter()
        .filter(|(exp, _)| exp == "May 15, 2020")
        .map(|(_, reason)| reason.as_str())
        .collect();
    assert_eq!(empty_page, vec!["No Calls Data", "No Puts Data", NO_DATA]);
    assert!(msft.iter().any(|(exp, reason)| exp == "May 22, 2020" && reason.contains("404")));

    let nope = report.entries("NOPE");
    assert_eq!(nope.len(), 1);
    assert_eq!(nope[0].0, NONE_KEY);
    assert!(report.entries("GE").is_empty());
}

#[tokio::test]
async fn test_low_budget_hands_remainder_to_one_continuation() {
    let symbols = ["A", "B", "C", "D", "E", "F", "G", "H", "I", "J"];
    let mut source = FakeSource::default();
    for symbol in symbols {
        source = source
            .listing(symbol, &["May 15, 2020"])
            .chain(symbol, "May 15, 2020", both_sides());
    }
    let store = MemoryStore::default();
    let continuation = RecordingContinuation::default();

    let (outcome, report) = run(
        &small_config(),
        &source,
        &store,
        &ScriptedContext::running_low_after(7),
        &continuation,
        tickers(&symbols),
    )
    .await;

    assert_eq!(outcome.dispatched, tickers(&symbols[..7]));
    assert_eq!(outcome.continued, Some(tickers(&["H", "I", "J"])));
    assert_eq!(outcome.records_written, 7);
    assert_eq!(source.listing_calls.load(Ordering::SeqCst), 7);

    let scheduled = continuation.scheduled.lock().unwrap();
    assert_eq!(
        *scheduled,
        vec![Invocation::Continue {
            tickers: vec!["H".to_string(), "I".to_string(), "J".to_string()],
            run: CollectionRun(42),
        }]
    );
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_failed_continuation_reports_every_deferred_ticker() {
    let source = FakeSource::default()
        .listing("A", &["May 15, 2020"])
        .chain("A", "May 15, 2020", both_sides());
    let continuation = RecordingContinuation {
        fail: true,
        ..RecordingContinuation::default()
    };

    let (outcome, report) = run(
        &small_config(),
        &source,
        &MemoryStore::default(),
        &ScriptedContext::running_low_after(1),
        &continuation,
        tickers(&["A", "B", "C"]),
    )
    .await;

    assert_eq!(outcome.dispatched, tickers(&["A"]));
    assert_eq!(continuation.scheduled.lock().unwrap().len(), 1);
    for symbol in ["B", "C"] {
        let entries = report.entries(symbol);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, NONE_KEY);
        assert!(entries[0].1.starts_with("Continuation Failed: "));
    }
    assert!(report.entries("A").is_empty());
}

#[tokio::test]
async fn test_failed_batches_are_reported_under_the_store_key() {
    let source = FakeSource::default()
        .listing("AAPL", &["May 15, 2020"])
        .chain("AAPL", "May 15, 2020", both_sides());
    let store = MemoryStore {
        fail: true,
        ..MemoryStore::default()
    };

    let (outcome, report) = run(
        &small_config(),
        &source,
        &store,
        &ScriptedContext::unlimited(),
        &RecordingContinuation::default(),
        tickers(&["AAPL"]),
    )
    .await;

    assert_eq!(outcome.records_written, 0);
    let failures = report.entries(STORE_KEY);
    assert_eq!(failures.len(), store.batches.load(Ordering::SeqCst));
    assert!(failures[0].1.contains("throughput exceeded"));
}

#[tokio::test]
async fn test_empty_backlog_terminates() {
    let (outcome, report) = run(
        &PipelineConfig::default(),
        &FakeSource::default(),
        &MemoryStore::default(),
        &ScriptedContext::unlimited(),
        &RecordingContinuation::default(),
        Vec::new(),
    )
    .await;

    assert_eq!(outcome, crate::pipeline::PipelineOutcome::default());
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_single_worker_pools_process_everything() {
    let config = PipelineConfig {
        resolver_workers: 1,
        ticker_queue_size: 1,
        max_connections: 1,
        writer_workers: 1,
        ..PipelineConfig::default()
    };
    let labels = ["May 15, 2020", "May 22, 2020", "May 29, 2020"];
    let mut source = FakeSource::default();
    for symbol in ["X", "Y"] {
        source = source.listing(symbol, &labels);
        for label in labels {
            source = source.chain(symbol, label, both_sides());
        }
    }
    let store = MemoryStore::default();

    let (outcome, report) = run(
        &config,
        &source,
        &store,
        &ScriptedContext::unlimited(),
        &RecordingContinuation::default(),
        tickers(&["X", "Y"]),
    )
    .await;

    assert_eq!(outcome.records_written, 6);
    assert!(report.is_empty());
}

#[test]
fn test_record_key_combines_collection_time_and_expiration() {
    let chain = FetchedChain {
        item: WorkItem {
            ticker: Ticker::parse("AAPL").unwrap(),
            expiration: ExpirationDate::parse_label("May 15, 2020").unwrap(),
        },
        tables: both_sides(),
    };
    let collected = NaiveDate::from_ymd_opt(2020, 5, 1)
        .unwrap()
        .and_hms_opt(14, 30, 5)
        .unwrap();

    let record = encode_record(&chain, collected).unwrap();

    assert_eq!(record.ticker.as_str(), "AAPL");
    assert_eq!(record.key.to_db_text(), "2020050114300520200515");
    assert_eq!(record.calls.unwrap().shape().unwrap(), (2, 1));
    assert_eq!(record.puts.unwrap().shape().unwrap(), (1, 1));
}

#[test]
fn test_encode_failure_surfaces_as_error() {
    let mut tables = both_sides();
    if let Some(calls) = tables.calls.as_mut() {
        calls.rows[0][1] = "lots".to_string();
    }
    let chain = FetchedChain {
        item: WorkItem {
            ticker: Ticker::parse("AAPL").unwrap(),
            expiration: ExpirationDate::parse_label("May 15, 2020").unwrap(),
        },
        tables,
    };

    assert!(encode_record(&chain, chrono::Utc::now().naive_utc()).is_err());
}

#[tokio::test]
async fn test_every_ticker_is_stored_reported_or_continued_exactly_once() {
    let source = FakeSource::default()
        .listing("A", &["May 15, 2020"])
        .chain("A", "May 15, 2020", both_sides())
        .listing("C", &[])
        .listing("D", &["May 15, 2020"])
        .chain("D", "May 15, 2020", both_sides());
    let store = MemoryStore::default();
    let input = tickers(&["A", "B", "C", "D", "E", "F"]);

    let (outcome, report) = run(
        &small_config(),
        &source,
        &store,
        &ScriptedContext::running_low_after(4),
        &RecordingContinuation::default(),
        input.clone(),
    )
    .await;

    let stored: std::collections::BTreeSet<String> = store
        .records
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.ticker.as_str().to_string())
        .collect();
    let reported: std::collections::BTreeSet<String> = report.keys().into_iter().collect();
    let continued: Vec<String> = outcome
        .continued
        .unwrap()
        .iter()
        .map(|t| t.as_str().to_string())
        .collect();

    assert_eq!(continued, vec!["E", "F"]);
    for ticker in &input {
        let symbol = ticker.as_str().to_string();
        let places = [
            stored.contains(&symbol),
            reported.contains(&symbol),
            continued.contains(&symbol),
        ];
        assert_eq!(places.iter().filter(|p| **p).count(), 1, "{} accounted for {:?}", symbol, places);
    }
}

#[tokio::test]
async fn test_malformed_chain_is_reported_and_dropped() {
    let mut malformed = both_sides();
    if let Some(calls) = malformed.calls.as_mut() {
        calls.rows[0][1] = "lots".to_string();
    }
    let source = FakeSource::default()
        .listing("AAPL", &["May 15, 2020", "May 22, 2020", "May 29, 2020", "May 15, -0001"])
        .chain("AAPL", "May 15, 2020", both_sides())
        .chain("AAPL", "May 22, 2020", malformed)
        .chain("AAPL", "May 29, 2020", both_sides());
    let store = MemoryStore::default();

    let (outcome, report) = run(
        &small_config(),
        &source,
        &store,
        &ScriptedContext::unlimited(),
        &RecordingContinuation::default(),
        tickers(&["AAPL"]),
    )
    .await;

    assert_eq!(outcome.records_written, 2);
    let mut stored: Vec<u32> = store
        .records
        .lock()
        .unwrap()
        .iter()
        .filter_map(|r| r.key.expiration().map(|e| e.yyyymmdd()))
        .collect();
    stored.sort_unstable();
    assert_eq!(stored, vec![20200515, 20200529]);

    let entries = report.entries("AAPL");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "May 15, -0001");
    assert!(entries[0].1.starts_with("Invalid Expiration Date"));
    assert_eq!(entries[1].0, "May 22, 2020");
    assert!(
        entries[1].1.starts_with("encoding error: malformed cell \"lots\""),
        "unexpected reason {:?}",
        entries[1].1
    );
}
