//! One collection invocation against the live site
//!
//! Reads configuration from the environment (`OPTIONS_HISTORY_DB`,
//! `MAXCONNECTIONS`, `NOTREACHABLE_URL`, ...), registers any tickers given
//! on the command line and runs a single `initialize` invocation with a
//! 15 minute budget.
//!
//! ```bash
//! RUST_LOG=options_history=debug cargo run --example collect_once -- AAPL MSFT
//! ```

use std::time::Duration;

use options_history::{Collector, Config, Database, DeadlineContext, Ticker};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let symbols: Vec<String> = std::env::args().skip(1).collect();
    if !symbols.is_empty() {
        let db = Database::new(&config.persistence.database_path).await?;
        for symbol in &symbols {
            let ticker = Ticker::parse(symbol)?;
            if db.add_ticker(&ticker).await? {
                println!("registered {}", ticker);
            }
        }
        db.close().await;
    }

    let collector = Collector::from_config(config).await?;
    let context = DeadlineContext::new(Duration::from_secs(15 * 60));
    let status = collector
        .handle(&serde_json::json!({ "State": "initialize" }), &context)
        .await;

    println!("invocation finished with status {}", status);
    Ok(())
}
