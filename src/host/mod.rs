//! Seams to the invoking host.
//!
//! - [`InvocationContext`] answers how much execution time is left
//! - [`ContinuationScheduler`] hands the unprocessed backlog to a follow-up invocation
//! - [`ErrorSink`] receives the run's unreachable report
//!
//! The webhook implementations POST JSON with a timeout, the same way for
//! both notifications.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::HostConfig;
use crate::error::{Error, Result};
use crate::types::Invocation;

/// Execution-time budget of the current invocation
pub trait InvocationContext: Send + Sync {
    /// Time left before the host terminates the invocation
    fn remaining_time(&self) -> Duration;
}

/// Fixed deadline measured from construction
#[derive(Clone, Debug)]
pub struct DeadlineContext {
    deadline: Instant,
}

impl DeadlineContext {
    /// Budget of `limit` starting now
    pub fn new(limit: Duration) -> Self {
        Self {
            deadline: Instant::now() + limit,
        }
    }
}

impl InvocationContext for DeadlineContext {
    fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Schedules a follow-up invocation
#[async_trait::async_trait]
pub trait ContinuationScheduler: Send + Sync {
    /// Enqueue `invocation` asynchronously (fire and forget on the host side)
    async fn schedule(&self, invocation: &Invocation) -> Result<()>;
}

/// Receives the end-of-run report
#[async_trait::async_trait]
pub trait ErrorSink: Send + Sync {
    /// Deliver one report message
    async fn send(&self, message: &serde_json::Value) -> Result<()>;
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    body: &serde_json::Value,
) -> std::result::Result<(), String> {
    let request = client.post(url).json(body).timeout(timeout);
    match tokio::time::timeout(timeout, request.send()).await {
        Ok(Ok(response)) if response.status().is_success() => Ok(()),
        Ok(Ok(response)) => Err(format!(
            "{} returned status {}: {}",
            url,
            response.status(),
            response.text().await.unwrap_or_default()
        )),
        Ok(Err(e)) => Err(format!("Failed to POST to {}: {}", url, e)),
        Err(_) => Err(format!("POST to {} timed out after {:?}", url, timeout)),
    }
}

/// Continuation delivered as an event POSTed to the host's invoke endpoint
pub struct WebhookContinuation {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookContinuation {
    /// POST continuation events to `url`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl ContinuationScheduler for WebhookContinuation {
    async fn schedule(&self, invocation: &Invocation) -> Result<()> {
        post_json(&self.client, &self.url, self.timeout, &invocation.to_event())
            .await
            .map_err(Error::Continuation)?;
        tracing::debug!(url = %self.url, "continuation scheduled");
        Ok(())
    }
}

/// Scheduler for hosts without a continuation endpoint; always fails
#[derive(Clone, Copy, Debug, Default)]
pub struct NoContinuation;

#[async_trait::async_trait]
impl ContinuationScheduler for NoContinuation {
    async fn schedule(&self, _invocation: &Invocation) -> Result<()> {
        Err(Error::Continuation(
            "no continuation endpoint configured".to_string(),
        ))
    }
}

/// Report POSTed as JSON to a queue or webhook endpoint
pub struct WebhookErrorSink {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookErrorSink {
    /// POST reports to `url`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl ErrorSink for WebhookErrorSink {
    async fn send(&self, message: &serde_json::Value) -> Result<()> {
        post_json(&self.client, &self.url, self.timeout, message)
            .await
            .map_err(Error::ErrorSink)
    }
}

/// Report written to the log only
#[derive(Clone, Copy, Debug, Default)]
pub struct LogErrorSink;

#[async_trait::async_trait]
impl ErrorSink for LogErrorSink {
    async fn send(&self, message: &serde_json::Value) -> Result<()> {
        tracing::info!(report = %message, "unreachable report");
        Ok(())
    }
}

/// Scheduler chosen by configuration
pub fn continuation_from_config(config: &HostConfig) -> Box<dyn ContinuationScheduler> {
    match &config.continuation_url {
        Some(url) => Box::new(WebhookContinuation::new(url.clone(), config.notify_timeout)),
        None => Box::new(NoContinuation),
    }
}

/// Error sink chosen by configuration
pub fn error_sink_from_config(config: &HostConfig) -> Box<dyn ErrorSink> {
    match &config.error_sink_url {
        Some(url) => Box::new(WebhookErrorSink::new(url.clone(), config.notify_timeout)),
        None => Box::new(LogErrorSink),
    }
}
