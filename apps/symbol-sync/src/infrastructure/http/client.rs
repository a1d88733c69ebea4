//! HTTP client for the symbols REST API with retry logic.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::api_types::{BatchResponse, CursorResponse};
use super::config::{RetryConfig, SymbolApiConfig};
use crate::application::ports::{ApiError, SymbolApi};
use crate::domain::symbol::{OpsPage, SnapshotPage, SymbolRecord, normalize_symbol};

/// Longest error body kept in `ApiError::Status`.
const MAX_ERROR_BODY: usize = 512;

/// Symbols REST client.
#[derive(Debug, Clone)]
pub struct SymbolApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    retry_config: RetryConfig,
}

impl SymbolApiClient {
    /// Create a new HTTP client from config.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidRequest` if the HTTP client cannot be built.
    pub fn new(config: &SymbolApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::InvalidRequest {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            retry_config: config.retry,
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` with `query`, retrying transient failures.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let mut backoff = ExponentialBackoff::new(&self.retry_config);

        loop {
            let mut request = self.client.get(&url).query(query);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    let last = e.to_string();
                    if e.is_builder() {
                        return Err(ApiError::InvalidRequest { message: last });
                    }
                    if let Some(delay) = backoff.next_backoff() {
                        tracing::warn!(
                            error = %last,
                            path,
                            delay_ms = delay.as_millis(),
                            attempt = backoff.attempt,
                            "Network error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(ApiError::RetriesExhausted {
                        attempts: backoff.attempt,
                        last,
                    });
                }
            };

            let status = response.status();

            if status.is_success() {
                let bytes = response.bytes().await.map_err(|e| ApiError::Transport {
                    message: e.to_string(),
                })?;
                return serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode {
                    message: e.to_string(),
                });
            }

            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());

            let mut body = response.text().await.unwrap_or_default();
            truncate_body(&mut body);

            match categorize_status(status) {
                ErrorCategory::RateLimited | ErrorCategory::Retryable => {
                    let last = format!("HTTP {}", status.as_u16());
                    let Some(backoff_delay) = backoff.next_backoff() else {
                        return Err(ApiError::RetriesExhausted {
                            attempts: backoff.attempt,
                            last,
                        });
                    };
                    let delay =
                        retry_delay(retry_after, backoff_delay, self.retry_config.max_backoff);
                    tracing::warn!(
                        status = status.as_u16(),
                        path,
                        delay_ms = delay.as_millis(),
                        attempt = backoff.attempt,
                        "Retryable HTTP status, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                ErrorCategory::NonRetryable => {
                    return Err(ApiError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl SymbolApi for SymbolApiClient {
    async fn fetch_snapshot(&self, limit: usize, offset: usize) -> Result<SnapshotPage, ApiError> {
        self.get(
            "/symbols/snapshot",
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )
        .await
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Result<Vec<SymbolRecord>, ApiError> {
        let syms: Vec<String> = symbols.iter().filter_map(|s| normalize_symbol(s)).collect();
        if syms.is_empty() {
            return Ok(Vec::new());
        }

        let response: BatchResponse = self
            .get("/symbols/batch", &[("syms", syms.join(","))])
            .await?;
        Ok(response
            .into_items()
            .into_iter()
            .filter_map(SymbolRecord::from_value)
            .collect())
    }

    async fn fetch_cursor(&self) -> Result<u64, ApiError> {
        let response: CursorResponse = self.get("/symbols/cursor", &[]).await?;
        Ok(response.value())
    }

    async fn fetch_ops_since(&self, since: u64, limit: usize) -> Result<OpsPage, ApiError> {
        self.get(
            "/symbols/ops",
            &[("since", since.to_string()), ("limit", limit.to_string())],
        )
        .await
    }
}

/// Server-requested `Retry-After` seconds win over the backoff, capped at
/// `ceiling`.
fn retry_delay(retry_after: Option<u64>, backoff: Duration, ceiling: Duration) -> Duration {
    retry_after.map_or(backoff, |secs| Duration::from_secs(secs).min(ceiling))
}

fn truncate_body(body: &mut String) {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
}

/// Error category for determining retry behavior.
enum ErrorCategory {
    RateLimited,
    Retryable,
    NonRetryable,
}

/// Categorize HTTP status code for retry handling.
const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        429 => ErrorCategory::RateLimited,
        408 | 500 | 502 | 503 | 504 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

/// Exponential backoff calculator.
struct ExponentialBackoff {
    attempt: u32,
    max_attempts: u32,
    current_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    const fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts,
            current_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
        }
    }

    /// Delay before the next attempt, or `None` once the attempt that just
    /// failed was the last one allowed.
    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.max_attempts {
            return None;
        }

        let backoff = self.current_backoff;
        self.current_backoff = Duration::from_secs_f64(
            (self.current_backoff.as_secs_f64() * self.multiplier)
                .min(self.max_backoff.as_secs_f64()),
        );

        Some(backoff)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    fn client(server: &MockServer, max_attempts: u32) -> SymbolApiClient {
        let config = SymbolApiConfig::new(server.uri())
            .with_token(Some("tok".into()))
            .with_retry(fast_retry(max_attempts));
        SymbolApiClient::new(&config).unwrap()
    }

    #[test]
    fn retry_after_is_capped_at_max_backoff() {
        let ceiling = Duration::from_secs(10);
        let backoff = Duration::from_millis(250);
        assert_eq!(retry_delay(None, backoff, ceiling), backoff);
        assert_eq!(retry_delay(Some(3), backoff, ceiling), Duration::from_secs(3));
        assert_eq!(retry_delay(Some(86_400), backoff, ceiling), ceiling);
    }

    #[tokio::test]
    async fn huge_retry_after_does_not_stall_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/symbols/cursor"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "86400"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/symbols/cursor"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"cursor": 3})))
            .mount(&server)
            .await;

        let cursor = tokio::time::timeout(Duration::from_secs(5), client(&server, 3).fetch_cursor())
            .await
            .expect("Retry-After should be capped")
            .unwrap();
        assert_eq!(cursor, 3);
    }

    #[test]
    fn categorize() {
        assert!(matches!(
            categorize_status(StatusCode::TOO_MANY_REQUESTS),
            ErrorCategory::RateLimited
        ));
        assert!(matches!(
            categorize_status(StatusCode::SERVICE_UNAVAILABLE),
            ErrorCategory::Retryable
        ));
        assert!(matches!(
            categorize_status(StatusCode::REQUEST_TIMEOUT),
            ErrorCategory::Retryable
        ));
        assert!(matches!(
            categorize_status(StatusCode::NOT_FOUND),
            ErrorCategory::NonRetryable
        ));
    }

    #[test]
    fn exponential_backoff_increments_and_caps() {
        let mut backoff = ExponentialBackoff::new(&RetryConfig {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
            multiplier: 2.0,
        });

        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_backoff(), None);
    }

    #[test]
    fn long_error_bodies_are_truncated_on_char_boundary() {
        let mut body = "é".repeat(MAX_ERROR_BODY);
        truncate_body(&mut body);
        assert!(body.len() <= MAX_ERROR_BODY);
        assert!(body.chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn snapshot_sends_paging_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/symbols/snapshot"))
            .and(query_param("limit", "1000"))
            .and(query_param("offset", "0"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"symbol": "AAPL"}],
                "count": 1,
                "currentCursor": 42
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client(&server, 3).fetch_snapshot(1000, 0).await.unwrap();

        assert_eq!(page.total(), 1);
        assert_eq!(page.cursor(), 42);
    }

    #[tokio::test]
    async fn batch_normalizes_symbols() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/symbols/batch"))
            .and(query_param("syms", "AAPL,MSFT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"symbol": "aapl", "price": 1}, {"symbol": "MSFT"}, {"nope": 1}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = client(&server, 3)
            .fetch_batch(&[" aapl ".into(), "msft".into(), "  ".into()])
            .await
            .unwrap();

        let symbols: Vec<&str> = records.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }

    #[tokio::test]
    async fn empty_batch_skips_request() {
        let server = MockServer::start().await;
        let records = client(&server, 3).fetch_batch(&[" ".into()]).await.unwrap();
        assert!(records.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_errors_retry_then_succeed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/symbols/cursor"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/symbols/cursor"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"cursor": 7})))
            .mount(&server)
            .await;

        assert_eq!(client(&server, 4).fetch_cursor().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn rate_limit_honors_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/symbols/ops"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/symbols/ops"))
            .and(query_param("since", "5"))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "from": 5, "to": 6, "ops": [], "hasMore": false
            })))
            .mount(&server)
            .await;

        let page = client(&server, 3).fetch_ops_since(5, 10).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_report_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, 3).fetch_cursor().await.unwrap_err();

        assert_eq!(
            err,
            ApiError::RetriesExhausted {
                attempts: 3,
                last: "HTTP 502".into()
            }
        );
    }

    #[tokio::test]
    async fn client_errors_do_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, 3).fetch_cursor().await.unwrap_err();

        assert_eq!(
            err,
            ApiError::Status {
                status: 404,
                body: "missing".into()
            }
        );
    }

    #[tokio::test]
    async fn invalid_json_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server, 3).fetch_snapshot(1, 0).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }
}
