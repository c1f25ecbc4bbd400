//! HTTP client for the managed database's REST interface.
//!
//! Each mirrored table is read with a single `GET <base>/rest/v1/<table>`
//! returning a JSON array of rows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{ApiError, RemoteSource};
use crate::cache::store::validate_key;
use crate::cache::Record;
use crate::config::Config;

// ============================================================================
// Constants
// ============================================================================

/// Path prefix of the table REST endpoints
const REST_PATH: &str = "rest/v1";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the remote tables.
/// Clone is cheap - reqwest::Client and the offline flag are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    offline: Arc<AtomicBool>,
}

impl ApiClient {
    /// Create a new API client for `base_url` (scheme required)
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
            return Err(ApiError::InvalidResponse(format!(
                "Base URL must start with http:// or https://: {}",
                trimmed
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: trimmed.to_string(),
            api_key: None,
            offline: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let base_url = config
            .api_base_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No API base URL configured"))?;
        let mut client = Self::new(base_url)?;
        client.api_key = config.api_key.clone();
        client.set_offline(config.offline_mode);
        Ok(client)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn table_url(&self, table: &str) -> Result<String, ApiError> {
        validate_key(table)
            .map_err(|_| ApiError::InvalidResponse(format!("Invalid table name: {}", table)))?;
        Ok(format!("{}/{}/{}?select=*", self.base_url, REST_PATH, table))
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        if let Some(ref key) = self.api_key {
            headers.insert("apikey", Self::header_value(key)?);
            headers.insert(
                header::AUTHORIZATION,
                Self::header_value(&format!("Bearer {}", key))?,
            );
        }
        Ok(headers)
    }

    fn header_value(value: &str) -> Result<header::HeaderValue, ApiError> {
        header::HeaderValue::from_str(value)
            .map_err(|_| ApiError::InvalidResponse("Credential contains invalid header characters".to_string()))
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit
    /// (should retry), or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .headers(self.auth_headers()?)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON: {}", e)));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }
}

#[async_trait]
impl RemoteSource for ApiClient {
    async fn fetch_table(&self, table: &str) -> Result<Vec<Record>, ApiError> {
        if !self.is_online() {
            return Err(ApiError::Offline);
        }
        let url = self.table_url(table)?;
        let rows: Vec<Record> = self.get(&url).await?;
        debug!(table = table, records = rows.len(), "Table fetched");
        Ok(rows)
    }

    fn is_online(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }
}
