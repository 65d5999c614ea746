//! HTTP utilities for Azure REST API calls

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Default number of retries for throttled or transient failures
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay between retries, doubled on each attempt
const BASE_DELAY_MS: u64 = 500;

/// Ceiling for a single backoff delay
const MAX_DELAY_MS: u64 = 30_000;

/// Overall timeout for a single request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let char_count = body.chars().count();
    let truncated = if char_count > MAX_LOG_BODY_LENGTH {
        let head: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Statuses worth retrying: throttling and transient server errors
fn should_retry(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// A non-success HTTP status returned by an Azure endpoint
#[derive(Debug, Clone, Error)]
#[error("API request failed: {status}")]
pub struct ApiStatusError {
    pub status: u16,
    /// Sanitized, truncated response body
    pub body: String,
}

/// Find the API response error behind an error chain
pub fn api_error(error: &anyhow::Error) -> Option<&ApiStatusError> {
    error
        .chain()
        .find_map(|e| e.downcast_ref::<ApiStatusError>())
}

/// Find the HTTP status behind an error, if it came from an API response
pub fn api_status(error: &anyhow::Error) -> Option<u16> {
    api_error(error).map(|e| e.status)
}

/// HTTP client wrapper for Azure API calls
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
    max_retries: u32,
}

impl ArmHttpClient {
    /// Create a new HTTP client with the default retry budget
    pub fn new() -> Result<Self> {
        Self::with_retries(DEFAULT_MAX_RETRIES)
    }

    /// Create a new HTTP client that retries transient failures `max_retries` times
    pub fn with_retries(max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("azinv/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            max_retries,
        })
    }

    /// Make an authenticated GET request to an Azure API
    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        tracing::debug!("GET {}", url);
        self.send_with_retry("GET", url, || self.client.get(url).bearer_auth(token))
            .await
    }

    /// Make an unauthenticated GET request (managed identity endpoints)
    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Value> {
        tracing::debug!("GET {}", url);
        self.send_with_retry("GET", url, || {
            let mut request = self.client.get(url).timeout(timeout);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request
        })
        .await
    }

    /// POST form data without a bearer token (token endpoints)
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value> {
        tracing::debug!("POST {}", url);
        self.send_with_retry("POST", url, || self.client.post(url).form(form))
            .await
    }

    async fn send_with_retry<F>(&self, verb: &str, url: &str, build: F) -> Result<Value>
    where
        F: Fn() -> RequestBuilder,
    {
        for attempt in 0..=self.max_retries {
            let response = build().send().await.context("Failed to send request")?;

            let status = response.status();
            if status.is_success() {
                let body = response
                    .text()
                    .await
                    .context("Failed to read response body")?;

                // Handle empty response
                if body.is_empty() {
                    return Ok(Value::Null);
                }

                return serde_json::from_str(&body).context("Failed to parse response JSON");
            }

            if should_retry(status) && attempt < self.max_retries {
                let delay = retry_delay(attempt);
                tracing::warn!(
                    "{} {} -> {}, retrying in {}ms",
                    verb,
                    url,
                    status,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let body = sanitize_for_log(&body);

            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            if status == StatusCode::NOT_FOUND {
                tracing::debug!("API error: {} - {}", status, body);
            } else {
                tracing::error!("API error: {} - {}", status, body);
            }

            return Err(ApiStatusError {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        Err(anyhow::anyhow!("Max retries exceeded for {} {}", verb, url))
    }
}

/// Format an Azure API error for display
/// Security: Sanitizes error messages to avoid leaking sensitive API details
pub fn format_arm_error(error: &anyhow::Error) -> String {
    // Security: These generic messages avoid leaking API structure details
    if let Some(status) = api_status(error) {
        let message = match status {
            401 => "Authentication failed. Sign in again or run 'az login'.",
            403 => "Permission denied. Check your Azure role assignments.",
            404 => "Resource not found.",
            429 => "Rate limit exceeded. Please try again later.",
            400 => "Invalid request. Check your parameters.",
            409 => "Resource conflict. The resource may be locked or in use.",
            500..=599 => "Azure service temporarily unavailable. Please try again.",
            _ => "Request failed. Check your network connection and try again.",
        };
        return message.to_string();
    }

    // Truncate long error messages and remove potential sensitive data
    let error_str = error.to_string();
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(80)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

/// Exponential backoff for the given attempt, capped at `MAX_DELAY_MS`
fn retry_delay(attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    Duration::from_millis(BASE_DELAY_MS.saturating_mul(factor).min(MAX_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_then_caps() {
        assert_eq!(retry_delay(0), Duration::from_millis(500));
        assert_eq!(retry_delay(1), Duration::from_millis(1000));
        assert_eq!(retry_delay(10), Duration::from_millis(MAX_DELAY_MS));
        assert_eq!(retry_delay(64), Duration::from_millis(MAX_DELAY_MS));
        assert_eq!(retry_delay(u32::MAX), Duration::from_millis(MAX_DELAY_MS));
    }

    #[test]
    fn sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(200)));
        assert!(sanitized.contains("truncated"));
        assert!(sanitized.contains("500 bytes total"));
    }

    #[test]
    fn sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log("a\nb\tc d"), "abc d");
    }

    #[test]
    fn sanitize_handles_multibyte_boundaries() {
        let body = "é".repeat(300);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("600 bytes total"));
    }

    #[test]
    fn retry_policy() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(should_retry(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!should_retry(StatusCode::NOT_FOUND));
        assert!(!should_retry(StatusCode::FORBIDDEN));
    }

    #[test]
    fn api_status_survives_context() {
        let err = anyhow::Error::new(ApiStatusError {
            status: 404,
            body: String::new(),
        })
        .context("Failed to fetch resource group");
        assert_eq!(api_status(&err), Some(404));
        assert_eq!(api_status(&anyhow::anyhow!("boom")), None);
    }

    #[test]
    fn format_known_statuses() {
        let err: anyhow::Error = ApiStatusError {
            status: 403,
            body: "AuthorizationFailed".into(),
        }
        .into();
        assert_eq!(
            format_arm_error(&err),
            "Permission denied. Check your Azure role assignments."
        );

        let err: anyhow::Error = ApiStatusError {
            status: 503,
            body: String::new(),
        }
        .into();
        assert!(format_arm_error(&err).contains("temporarily unavailable"));
    }

    #[test]
    fn format_truncates_unknown_errors() {
        let err = anyhow::anyhow!("{}", "y".repeat(120));
        let formatted = format_arm_error(&err);
        assert!(formatted.ends_with("..."));
        assert_eq!(formatted.len(), 83);
    }
}
