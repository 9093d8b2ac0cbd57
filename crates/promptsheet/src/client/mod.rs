//! Completion clients: how a rendered prompt becomes a JSON answer.
//!
//! - [`Completer`] — the seam the sweep talks to. Dyn-compatible through a
//!   boxed future so servers can hold an `Arc<dyn Completer>`.
//! - [`http`] — [`HttpCompleter`], a reqwest client that POSTs
//!   `{"prompt": ...}` to the relay or straight to the classification
//!   endpoint.
//! - [`retry`] — transient failure detection and backoff for the HTTP client.
//! - [`heuristic`] — [`HeuristicCompleter`], an offline stand-in that answers
//!   from a fixed list of engineering majors.

pub mod heuristic;
pub mod http;
pub mod retry;

pub use heuristic::HeuristicCompleter;
pub use http::HttpCompleter;
pub use retry::RetryConfig;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// Future returned by [`Completer::complete`].
pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, CompletionError>> + Send + 'a>>;

/// Why a completion call produced no usable JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// The request never got a response (DNS, connect, timeout, reset).
    #[error("request failed: {0}")]
    Transport(String),
    /// The endpoint answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// The body was not valid JSON.
    #[error("failed to parse response: {0}")]
    Decode(String),
}

impl CompletionError {
    /// Whether retrying the same request may succeed (429, 500, 502-504,
    /// transport).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => matches!(*status, 429 | 500 | 502 | 503 | 504),
            Self::Decode(_) => false,
        }
    }
}

/// Something that answers a rendered prompt with JSON.
///
/// # Example
///
/// ```
/// use promptsheet::client::{Completer, CompletionFuture};
/// use serde_json::json;
///
/// struct AlwaysYes;
///
/// impl Completer for AlwaysYes {
///     fn complete<'a>(&'a self, _prompt: &'a str) -> CompletionFuture<'a> {
///         Box::pin(async { Ok(json!({"isEngineer": true})) })
///     }
/// }
/// ```
pub trait Completer: Send + Sync {
    fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a>;
}

impl<T: Completer + ?Sized> Completer for Arc<T> {
    fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a> {
        (**self).complete(prompt)
    }
}

impl<T: Completer + ?Sized> Completer for &T {
    fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a> {
        (**self).complete(prompt)
    }
}
