//! Shared helpers for integration tests
#![allow(dead_code)]

pub mod fixtures;

use serde_json::Value;
use wiremock::MockServer;

/// JSON bodies POSTed to `path` on `server`
pub async fn posted_json(server: &MockServer, path: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.method.as_str() == "POST" && request.url.path() == path)
        .filter_map(|request| serde_json::from_slice(&request.body).ok())
        .collect()
}
