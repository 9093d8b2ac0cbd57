//! Client configuration with sensible defaults.
//!
//! [`ClientConfig`] says where prompts are sent and how patiently. Build it
//! with [`ClientConfig::new`] and the `with_*` builders, or start from
//! [`ClientConfig::from_env`] to honour `PROMPTSHEET_ENDPOINT`.
//!
//! ```
//! use promptsheet::config::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::relay("http://localhost:3001")
//!     .with_timeout(Duration::from_secs(10))
//!     .with_retries(2);
//! assert_eq!(config.endpoint, "http://localhost:3001/api/ai-proxy");
//! ```

use std::time::Duration;

use crate::client::RetryConfig;

/// Base URL of the hosted classification service.
pub const DEFAULT_UPSTREAM_URL: &str = "https://ai-powered-spreadsheet.onrender.com";
/// Path of the classification endpoint on the upstream service.
pub const CHECK_PATH: &str = "/check-engineer";
/// Path of the relay on the sheet server.
pub const PROXY_PATH: &str = "/api/ai-proxy";
/// Environment variable that overrides the completion endpoint.
pub const ENDPOINT_ENV: &str = "PROMPTSHEET_ENDPOINT";

/// Where and how completion requests are sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Full URL prompts are POSTed to. Default: the upstream `/check-engineer`.
    pub endpoint: String,
    /// Per-request timeout. Default: 30 seconds.
    pub timeout: Duration,
    /// Retry policy for transient failures. Default: no retries.
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::upstream(DEFAULT_UPSTREAM_URL)
    }
}

impl ClientConfig {
    /// Post prompts to an explicit URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// Post prompts straight to an upstream service's classification endpoint.
    pub fn upstream(base_url: &str) -> Self {
        Self::new(join_url(base_url, CHECK_PATH))
    }

    /// Post prompts through a sheet server's relay.
    pub fn relay(server_url: &str) -> Self {
        Self::new(join_url(server_url, PROXY_PATH))
    }

    /// Defaults, with the endpoint taken from `PROMPTSHEET_ENDPOINT` when set.
    pub fn from_env() -> Self {
        match std::env::var(ENDPOINT_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry.max_retries = retries;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Join a base URL and an absolute path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
