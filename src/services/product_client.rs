//! Product Data API Client
//!
//! Looks up one product code at a time against the external product data
//! API. Every call is preceded by a fixed throttle delay; 429, 5xx and
//! transport failures are retried with exponential backoff.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::ClientConfig;
use crate::models::product::ProductResponse;

/// Longest error body kept in error messages.
const MAX_ERROR_BODY: usize = 500;

/// Source of raw product payloads for an identifier.
///
/// `Ok(None)` means the API answered but knows no product for the code.
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch(&self, identifier: &str) -> Result<Option<serde_json::Value>, ProductApiError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProductApiError {
    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("Product API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request to product API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode product API response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// HTTP client for the product data API.
pub struct ProductApiClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl ProductApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ProductApiError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("price-watch/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(Self { http, config })
    }

    /// Backoff before retry number `attempt + 1`: `retry_delay * 2^attempt`.
    fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.config
            .retry_delay
            .checked_mul(multiplier)
            .unwrap_or(Duration::MAX)
    }

    async fn request(&self, identifier: &str) -> Result<serde_json::Value, ProductApiError> {
        let url = format!("{}/product", self.config.api_url.trim_end_matches('/'));
        let params = [
            ("code", identifier.to_string()),
            ("domain", self.config.domain.to_string()),
            ("stats", self.config.stats_days.to_string()),
            ("history", "1".to_string()),
            ("key", self.config.api_key.clone()),
        ];

        let mut attempt = 0;
        loop {
            let error = match self.http.get(&url).query(&params).send().await {
                Ok(response) if response.status().is_success() => match response.bytes().await {
                    Ok(body) => return Ok(serde_json::from_slice(&body)?),
                    // Connection dropped mid-body.
                    Err(e) => ProductApiError::Transport(e),
                },
                Ok(response) => {
                    let status = response.status();
                    let message = truncate(response.text().await.unwrap_or_default());
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        ProductApiError::RateLimitExceeded {
                            attempts: attempt + 1,
                        }
                    } else if status.is_server_error() {
                        ProductApiError::Api {
                            status: status.as_u16(),
                            message,
                        }
                    } else {
                        tracing::error!(
                            identifier,
                            status = status.as_u16(),
                            "Product API rejected request"
                        );
                        return Err(ProductApiError::Api {
                            status: status.as_u16(),
                            message,
                        });
                    }
                }
                Err(e) => ProductApiError::Transport(e),
            };

            if attempt >= self.config.max_retries {
                tracing::error!(identifier, attempts = attempt + 1, error = %error, "Giving up on product lookup");
                return Err(error);
            }

            let delay = self.backoff(attempt);
            tracing::warn!(
                identifier,
                attempt = attempt + 1,
                max = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying product lookup"
            );
            metrics::counter!("product_api_retries_total").increment(1);
            sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl ProductSource for ProductApiClient {
    async fn fetch(&self, identifier: &str) -> Result<Option<serde_json::Value>, ProductApiError> {
        sleep(self.config.request_delay).await;

        tracing::debug!(identifier, "Fetching product data");
        let body = self.request(identifier).await?;

        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            return Err(ProductApiError::Api {
                status: StatusCode::OK.as_u16(),
                message: truncate(error.to_string()),
            });
        }

        if ProductResponse::is_empty_payload(&body) {
            tracing::info!(identifier, "No product found");
            return Ok(None);
        }

        Ok(Some(body))
    }
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(retry_delay_ms: u64) -> ProductApiClient {
        ProductApiClient::new(ClientConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            api_key: "secret".to_string(),
            domain: 1,
            stats_days: 180,
            request_delay: Duration::ZERO,
            retry_delay: Duration::from_millis(retry_delay_ms),
            max_retries: 3,
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn test_backoff_doubles() {
        let client = client(2000);
        assert_eq!(client.backoff(0), Duration::from_secs(2));
        assert_eq!(client.backoff(1), Duration::from_secs(4));
        assert_eq!(client.backoff(2), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_large_attempt_does_not_overflow() {
        let client = client(2000);
        assert_eq!(client.backoff(64), Duration::from_millis(2000) * u32::MAX);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(400);
        let truncated = truncate(text);
        assert!(truncated.len() <= MAX_ERROR_BODY);
        assert!(truncated.chars().all(|c| c == 'é'));
    }
}
