//! reqwest-backed [`Completer`].

use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::{Completer, CompletionError, CompletionFuture, RetryConfig};
use crate::config::ClientConfig;

/// Request body understood by both the relay and the classification endpoint.
#[derive(Serialize, Debug)]
pub struct PromptRequest<'a> {
    pub prompt: &'a str,
}

/// Async HTTP client that POSTs prompts to a JSON endpoint.
#[derive(Debug, Clone)]
pub struct HttpCompleter {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryConfig,
}

impl HttpCompleter {
    /// Build a client from configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("promptsheet/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| CompletionError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            retry: config.retry.clone(),
        })
    }

    /// The URL prompts are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST a prompt, retrying transient failures per the retry config.
    pub async fn post_prompt(&self, prompt: &str) -> Result<Value, CompletionError> {
        let mut attempt = 0;
        loop {
            match self.post_once(prompt).await {
                Ok(value) => return Ok(value),
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        "completion attempt {} failed ({e}), retrying in {:.1}s",
                        attempt + 1,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_once(&self, prompt: &str) -> Result<Value, CompletionError> {
        debug!("completion request: endpoint={}, prompt_len={}", self.endpoint, prompt.len());
        trace!("prompt: {prompt}");
        let start = Instant::now();

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&PromptRequest { prompt })
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CompletionError::Transport(format!("failed to read response: {e}")))?;

        debug!(
            "completion response: HTTP {} in {:.2}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| CompletionError::Decode(e.to_string()))
    }
}

impl Completer for HttpCompleter {
    fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a> {
        Box::pin(self.post_prompt(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use serde_json::json;

    #[test]
    fn prompt_request_shape() {
        let body = serde_json::to_value(PromptRequest { prompt: "hi" }).unwrap();
        assert_eq!(body, serde_json::json!({"prompt": "hi"}));
    }

    #[test]
    fn builds_from_config() {
        let config = ClientConfig::new("http://127.0.0.1:9/check-engineer")
            .with_timeout(Duration::from_secs(1))
            .with_retries(2);
        let client = HttpCompleter::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:9/check-engineer");
        assert_eq!(client.retry.max_retries, 2);
    }

    /// Local `/check-engineer` that answers with `statuses` in turn, then
    /// with JSON, counting requests.
    async fn spawn_flaky(statuses: Vec<u16>) -> (Arc<AtomicUsize>, String) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let router = Router::new().route(
            "/check-engineer",
            post(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let status = statuses.get(n).copied();
                async move {
                    match status {
                        Some(code) => {
                            let code = StatusCode::from_u16(code).unwrap();
                            (code, "try later").into_response()
                        }
                        None => axum::Json(json!({"isEngineer": true})).into_response(),
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (calls, format!("http://{addr}/check-engineer"))
    }

    fn fast_retry(retries: u32) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(10),
            ..RetryConfig::with_retries(retries)
        }
    }

    #[tokio::test]
    async fn transient_status_is_retried_until_success() {
        let (calls, endpoint) = spawn_flaky(vec![503]).await;
        let config = ClientConfig::new(endpoint)
            .with_timeout(Duration::from_secs(5))
            .with_retry(fast_retry(1));
        let client = HttpCompleter::new(&config).unwrap();

        let value = client.complete("Computer Science").await.unwrap();
        assert_eq!(value, json!({"isEngineer": true}));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_stop_after_budget() {
        let (calls, endpoint) = spawn_flaky(vec![503, 502, 500]).await;
        let config = ClientConfig::new(endpoint)
            .with_timeout(Duration::from_secs(5))
            .with_retry(fast_retry(1));
        let client = HttpCompleter::new(&config).unwrap();

        let err = client.complete("Biology").await.unwrap_err();
        assert!(
            matches!(err, CompletionError::Status { status: 502, .. }),
            "{err:?}"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let (calls, endpoint) = spawn_flaky(vec![400]).await;
        let config = ClientConfig::new(endpoint)
            .with_timeout(Duration::from_secs(5))
            .with_retry(fast_retry(3));
        let client = HttpCompleter::new(&config).unwrap();

        let err = client.complete("Biology").await.unwrap_err();
        assert!(
            matches!(err, CompletionError::Status { status: 400, .. }),
            "{err:?}"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        // Grab a free port, then release it so nothing is listening there.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = ClientConfig::new(format!("http://127.0.0.1:{port}/check-engineer"))
            .with_timeout(Duration::from_secs(2));
        let client = HttpCompleter::new(&config).unwrap();
        let err = client.complete("hello").await.unwrap_err();
        assert!(matches!(err, CompletionError::Transport(_)), "{err:?}");
    }
}
