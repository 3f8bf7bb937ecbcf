//! HTTP fetcher for remote record APIs.

use crate::config::FetcherConfig;
use crate::records::records_to_dataset;
use csvhub_core::{CatalogError, FetchError, Result, TabularDataset};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use std::error::Error as _;
use std::time::Instant;
use url::Url;

/// Retrieves JSON records from third-party APIs.
///
/// One `GET` per call under a hard timeout. Nothing is retried: a failed
/// fetch fails the join that asked for it.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http: reqwest::Client,
    config: FetcherConfig,
}

impl Fetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetcherConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("csvhub-fetch")),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| CatalogError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch `url` and convert its JSON records into a dataset.
    pub async fn fetch(&self, url: &Url) -> std::result::Result<TabularDataset, FetchError> {
        let start = Instant::now();
        tracing::debug!(url = %url, "Fetching remote records");

        let mut response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                url = %url,
                status = %status.as_u16(),
                duration_ms = %start.elapsed().as_millis(),
                "Remote API returned an error status"
            );
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        let limit = self.config.max_body_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(body_too_large(limit));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.transport_error(url, e))?
        {
            if body.len() + chunk.len() > limit {
                return Err(body_too_large(limit));
            }
            body.extend_from_slice(&chunk);
        }

        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| FetchError::MalformedBody(format!("invalid JSON: {}", e)))?;
        let dataset = records_to_dataset(value)?;

        tracing::debug!(
            url = %url,
            status = %status.as_u16(),
            bytes = body.len(),
            rows = dataset.num_rows(),
            columns = dataset.num_columns(),
            duration_ms = %start.elapsed().as_millis(),
            "Fetched remote records"
        );

        Ok(dataset)
    }

    fn transport_error(&self, url: &Url, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            tracing::warn!(url = %url, timeout = ?self.config.timeout, "Remote API timed out");
            return FetchError::Timeout(self.config.timeout);
        }

        let mut reason = e.to_string();
        let mut source = e.source();
        while let Some(cause) = source {
            reason.push_str(": ");
            reason.push_str(&cause.to_string());
            source = cause.source();
        }
        tracing::warn!(url = %url, error = %reason, "Remote API unreachable");
        FetchError::Unreachable(reason)
    }
}

fn body_too_large(limit: usize) -> FetchError {
    FetchError::MalformedBody(format!("response body exceeds {} bytes", limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = FetcherConfig {
            max_body_bytes: 0,
            ..FetcherConfig::default()
        };
        assert!(Fetcher::new(config).is_err());
    }

    #[test]
    fn test_new_keeps_config() {
        let fetcher = Fetcher::new(FetcherConfig::default()).unwrap();
        assert_eq!(fetcher.config().timeout, crate::config::DEFAULT_TIMEOUT);
    }
}
