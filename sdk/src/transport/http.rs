//! HTTP transport for the MarginDash collector
//!
//! POSTs each batch as `{"events": [...]}` to `{base_url}/events`.
//!
//! # Example
//!
//! ```ignore
//! let transport = HttpTransport::new("https://app.margindash.com/api/v1", "md_live_...")?
//!     .header("X-Request-Source", "billing-worker");
//! ```

use crate::config::Config;
use crate::error::TransportError;
use crate::event::PendingEvent;
use crate::transport::{BatchTransport, DeliveryOutcome, EventFailure};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

const USER_AGENT: &str = concat!("margindash-rust/", env!("CARGO_PKG_VERSION"));

/// Request body
#[derive(Serialize)]
struct BatchPayload<'a> {
    events: &'a [PendingEvent],
}

/// Response body of a batch request
#[derive(Debug, Default, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    results: Vec<BatchResult>,
    #[serde(default)]
    error: Option<String>,
}

/// Per-event entry in a batch response
#[derive(Debug, Deserialize)]
struct BatchResult {
    status: String,
    #[serde(default)]
    errors: Vec<String>,
}

/// HTTP transport - POSTs batches as JSON
pub struct HttpTransport {
    client: Client,
    url: String,
    api_key: String,
    headers: HashMap<String, String>,
}

impl HttpTransport {
    /// Create a transport for the collector at `base_url`
    ///
    /// Uses default timeouts: 30s request timeout, 10s connection timeout
    ///
    /// # Errors
    /// Returns `TransportError::Init` if the HTTP client cannot be created
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_timeouts(
            base_url,
            api_key,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Create a transport with explicit request and connect timeouts
    pub fn with_timeouts(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Init(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/events", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            headers: HashMap::new(),
        })
    }

    /// Build from shipper configuration
    ///
    /// # Errors
    /// Returns `TransportError::Init` when no API key is configured
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| TransportError::Init("missing API key".to_string()))?;
        Self::new(&config.base_url, api_key)
    }

    /// Add a custom header to all requests
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Endpoint batches are posted to
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, events: &[PendingEvent]) -> Result<DeliveryOutcome, TransportError> {
        if events.is_empty() {
            return Ok(DeliveryOutcome::Success);
        }

        let mut request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&BatchPayload { events });

        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            warn!(url = %self.url, error = %e, "Collector request failed");
            if e.is_timeout() {
                TransportError::Timeout(e.to_string())
            } else if e.is_connect() {
                TransportError::Connection(format!("Failed to connect to {}: {e}", self.url))
            } else {
                TransportError::Send(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Send(format!("Failed to read response body: {e}")))?;

        let outcome = classify_response(status, &body, events.len());
        debug!(
            url = %self.url,
            count = events.len(),
            status = %status,
            outcome = outcome.label(),
            "Collector responded"
        );
        Ok(outcome)
    }
}

/// Map a collector response onto a `DeliveryOutcome`
///
/// - 207 carries per-event results; entries with status `error` are failures
/// - other 2xx: the batch was accepted
/// - 408, 429 and 5xx: retryable, the collector made no per-event decision
/// - any other status: terminal
pub fn classify_response(status: StatusCode, body: &str, batch_len: usize) -> DeliveryOutcome {
    let parsed: BatchResponse = serde_json::from_str(body).unwrap_or_default();

    if status == StatusCode::MULTI_STATUS {
        let failed: Vec<EventFailure> = parsed
            .results
            .into_iter()
            .enumerate()
            .filter(|(_, result)| result.status == "error")
            .map(|(index, result)| EventFailure {
                index,
                errors: result.errors,
            })
            .collect();

        return if failed.is_empty() {
            DeliveryOutcome::Success
        } else {
            DeliveryOutcome::PartialFailure {
                failed,
                total: batch_len,
            }
        };
    }

    if status.is_success() {
        return DeliveryOutcome::Success;
    }

    let retryable = status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT;

    let message = parsed
        .error
        .or_else(|| {
            let errors: Vec<String> = parsed
                .results
                .into_iter()
                .flat_map(|result| result.errors)
                .collect();
            (!errors.is_empty()).then(|| errors.join("; "))
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        });

    DeliveryOutcome::TotalFailure {
        status: status.as_u16(),
        message,
        retryable,
    }
}
