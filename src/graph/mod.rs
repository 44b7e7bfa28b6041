pub mod audit;
pub mod auth;
pub mod planner;
pub mod service_principals;
pub mod users;

use crate::config::ConfigManager;
use crate::error::{Exp365Error, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 30000;
const JITTER_FACTOR: f64 = 0.3; // +/- 30% jitter

/// Exponential backoff with jitter, used only when retries are enabled
fn calculate_backoff_with_jitter(attempt: u32) -> Duration {
    let base_backoff = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    let capped_backoff = base_backoff.min(MAX_BACKOFF_MS);

    let jitter_range = (capped_backoff as f64 * JITTER_FACTOR) as u64;
    let jitter = if jitter_range > 0 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::time::SystemTime::now().hash(&mut hasher);
        (hasher.finish() % (jitter_range * 2)) as i64 - jitter_range as i64
    } else {
        0
    };

    Duration::from_millis((capped_backoff as i64 + jitter).max(100) as u64)
}

/// Read-only Graph API client
///
/// Every request is preceded by the configured fixed delay. Retries are off
/// unless `max_retries` is raised.
#[derive(Debug, Clone)]
pub struct GraphClient {
    client: Client,
    access_token: String,
    base_url: String,
    request_delay: Duration,
    max_retries: u32,
}

impl GraphClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            access_token: access_token.into(),
            base_url: GRAPH_API_BASE.to_string(),
            request_delay: Duration::ZERO,
            max_retries: 0,
        }
    }

    /// Point the client at another root, e.g. a mock server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a client for a configured tenant using its cached token
    pub async fn from_config(config: &ConfigManager, tenant_name: &str) -> Result<Self> {
        let graph_auth = auth::GraphAuth::new(config.clone());
        let access_token = graph_auth.get_access_token(tenant_name).await?;
        let defaults = config.load_config()?.export;

        Ok(Self::new(access_token)
            .with_request_delay(Duration::from_millis(defaults.request_delay_ms))
            .with_max_retries(defaults.max_retries))
    }

    /// Absolute URL for an endpoint; absolute inputs (nextLinks) pass through
    pub fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    /// GET an endpoint relative to the base URL (or an absolute URL)
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.get_with_retry(&self.url_for(endpoint)).await
    }

    async fn get_with_retry<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let attempts = self.max_retries + 1;
        let mut last_error = None;

        for attempt in 0..attempts {
            let is_last = attempt + 1 == attempts;

            if !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            tracing::debug!(url, attempt, "GET");
            let response = self
                .client
                .get(url)
                .bearer_auth(&self.access_token)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS && !is_last {
                        let retry_after = resp
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(INITIAL_BACKOFF_MS / 1000);

                        tracing::warn!(
                            "Rate limited (429). Retrying in {} seconds... (attempt {}/{})",
                            retry_after,
                            attempt + 1,
                            attempts
                        );
                        tokio::time::sleep(Duration::from_secs(retry_after)).await;
                        continue;
                    }

                    if status.is_server_error() && !is_last {
                        let wait_time = calculate_backoff_with_jitter(attempt);
                        tracing::warn!(
                            "Server error ({}). Retrying in {:?}... (attempt {}/{})",
                            status,
                            wait_time,
                            attempt + 1,
                            attempts
                        );
                        tokio::time::sleep(wait_time).await;
                        continue;
                    }

                    if status == StatusCode::NOT_FOUND {
                        let error_text = resp.text().await.unwrap_or_default();
                        return Err(Exp365Error::NotFound(crate::error::enhance_graph_error(
                            &error_text,
                        )));
                    }

                    if !status.is_success() {
                        let error_text = resp.text().await.unwrap_or_default();
                        let enhanced_error = crate::error::enhance_graph_error(&error_text);
                        return Err(Exp365Error::GraphApiError(format!(
                            "HTTP {}: {}",
                            status, enhanced_error
                        )));
                    }

                    return Ok(resp.json::<T>().await?);
                }
                Err(e) => {
                    if !is_last {
                        let wait_time = calculate_backoff_with_jitter(attempt);
                        tracing::warn!(
                            "Connection error: {}. Retrying in {:?}... (attempt {}/{})",
                            e,
                            wait_time,
                            attempt + 1,
                            attempts
                        );
                        tokio::time::sleep(wait_time).await;
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(last_error.map(|e| e.into()).unwrap_or_else(|| {
            Exp365Error::GraphApiError(format!("GET {} failed after {} attempts", url, attempts))
        }))
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// Standard OData page: `value` array plus an optional `@odata.nextLink`
#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Items gathered by following continuation links
#[derive(Debug)]
pub struct PageCollection<T> {
    pub items: Vec<T>,
    pub pages: usize,
    /// False when a request failed or the page cap stopped traversal early
    pub complete: bool,
}

impl<T> PageCollection<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl GraphClient {
    /// Follow `@odata.nextLink` until exhausted
    ///
    /// A failed request ends the traversal with a warning; items from earlier
    /// pages are kept and `complete` is false.
    pub async fn collect_pages<T: DeserializeOwned>(&self, endpoint: &str) -> PageCollection<T> {
        self.collect_pages_limited(endpoint, 0).await
    }

    /// Like [`collect_pages`](Self::collect_pages) but stops after `max_pages` (0 = unlimited)
    pub async fn collect_pages_limited<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        max_pages: usize,
    ) -> PageCollection<T> {
        let mut items: Vec<T> = Vec::new();
        let mut pages = 0;
        let mut current_url = self.url_for(endpoint);

        let complete = loop {
            let page: PaginatedResponse<T> = match self.get_with_retry(&current_url).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        url = %current_url,
                        collected = items.len(),
                        "Pagination stopped early, keeping items collected so far: {}",
                        e
                    );
                    break false;
                }
            };

            items.extend(page.value);
            pages += 1;

            match page.next_link {
                None => break true,
                Some(_) if max_pages > 0 && pages >= max_pages => {
                    tracing::debug!(pages, "Page limit reached");
                    break false;
                }
                Some(next) => current_url = next,
            }
        };

        PageCollection {
            items,
            pages,
            complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_relative_and_absolute() {
        let client = GraphClient::new("token").with_base_url("http://localhost:1234/v1.0/");
        assert_eq!(
            client.url_for("/planner/plans/abc"),
            "http://localhost:1234/v1.0/planner/plans/abc"
        );
        assert_eq!(
            client.url_for("https://graph.microsoft.com/v1.0/users?$skiptoken=x"),
            "https://graph.microsoft.com/v1.0/users?$skiptoken=x"
        );
    }

    #[test]
    fn test_backoff_is_capped() {
        let wait = calculate_backoff_with_jitter(10);
        let max = MAX_BACKOFF_MS + (MAX_BACKOFF_MS as f64 * JITTER_FACTOR) as u64;
        assert!(wait.as_millis() as u64 <= max);
        assert!(wait.as_millis() >= 100);
    }

    #[test]
    fn test_paginated_response_without_value() {
        let page: PaginatedResponse<serde_json::Value> =
            serde_json::from_str(r#"{"@odata.context":"x"}"#).unwrap();
        assert!(page.value.is_empty());
        assert!(page.next_link.is_none());
    }
}
