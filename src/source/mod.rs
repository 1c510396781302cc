//! Options-chain source: page fetching and extraction.
//!
//! [`OptionsSource`] is the seam the pipeline fetches through.
//! [`HttpOptionsSource`] is the production implementation: one pooled
//! `reqwest` client with a fixed identity, and a semaphore bounding
//! in-flight requests across every stage that uses it.

pub mod parse;

use std::sync::Arc;
use tokio::sync::Semaphore;
use url::Url;

use crate::config::SourceConfig;
use crate::encoding::RawChainTables;
use crate::error::{Error, Result, ScrapeError};
use crate::types::{ExpirationDate, Ticker, WorkItem};

/// Abstraction over the finance site, enabling testability.
#[async_trait::async_trait]
pub trait OptionsSource: Send + Sync {
    /// Expiration labels offered on the ticker's listing page, in page order
    async fn expiration_labels(&self, ticker: &Ticker) -> Result<Vec<String>>;

    /// Calls and puts tables for one expiration
    async fn chain_tables(&self, item: &WorkItem) -> Result<RawChainTables>;
}

/// URL of a ticker's options page, optionally pinned to one expiration
///
/// `{base}/quote/{T}/options?p={T}[&date={unix seconds}]`
pub fn options_url(base: &Url, ticker: &Ticker, expiration: Option<&ExpirationDate>) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("/quote/{}/options", ticker));
    {
        let mut query = url.query_pairs_mut();
        query.clear().append_pair("p", ticker.as_str());
        if let Some(date) = expiration {
            query.append_pair("date", &date.unix_timestamp().to_string());
        }
    }
    url
}

/// Production [`OptionsSource`] backed by a shared `reqwest` client.
pub struct HttpOptionsSource {
    client: reqwest::Client,
    base_url: Url,
    in_flight: Arc<Semaphore>,
}

impl HttpOptionsSource {
    /// Create a source allowing at most `max_connections` concurrent requests
    ///
    /// # Errors
    /// Returns error if the base URL is invalid or the HTTP client cannot be created
    pub fn new(config: &SourceConfig, max_connections: usize) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| Error::Config {
            message: format!("invalid base_url {:?}: {}", config.base_url, e),
            key: Some("base_url".to_string()),
        })?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("text/html"),
        );
        headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            reqwest::header::HeaderValue::from_static("identity"),
        );

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .pool_max_idle_per_host(max_connections)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to create HTTP client: {}", e),
                key: None,
            })?;

        Ok(Self {
            client,
            base_url,
            in_flight: Arc::new(Semaphore::new(max_connections.max(1))),
        })
    }

    async fn fetch(&self, url: Url) -> Result<String> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| Error::Config {
                message: "HTTP connection limiter closed".to_string(),
                key: None,
            })?;

        tracing::debug!(url = %url, "fetching options page");
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(ScrapeError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            }
            .into());
        }
        Ok(response.text().await?)
    }
}

#[async_trait::async_trait]
impl OptionsSource for HttpOptionsSource {
    async fn expiration_labels(&self, ticker: &Ticker) -> Result<Vec<String>> {
        let html = self.fetch(options_url(&self.base_url, ticker, None)).await?;
        Ok(parse::expiration_labels(&html))
    }

    async fn chain_tables(&self, item: &WorkItem) -> Result<RawChainTables> {
        let url = options_url(&self.base_url, &item.ticker, Some(&item.expiration));
        let html = self.fetch(url).await?;
        Ok(parse::chain_tables(&html)?)
    }
}
