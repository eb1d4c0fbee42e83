//! Engine and transport error types.

use thiserror::Error;

use crate::push::error::ApiError;

/// Errors raised synchronously by the engine, before or outside dispatch.
///
/// Partial failure of a run is never an `EngineError`: failed batches are
/// reported through the [`ErrorLog`](crate::collection::ErrorLog).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Configuration or input that can never be dispatched.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Two collections being merged both hold a value at `index`.
    #[error("cannot merge collections: index {index} is present in both")]
    OverlappingIndex { index: usize },
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Errors that can occur while a transport sends one request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, TLS, body read, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request timed out after the configured duration.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The API answered and reported one or more request-level errors.
    #[error("API error (HTTP {status}): {}", summarize(.errors))]
    Api { status: u16, errors: Vec<ApiError> },

    /// The API rejected the request for exceeding its rate limit and sent no
    /// structured error body.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Response could not be deserialized.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if no structured response was produced, i.e. the
    /// request failed below the API layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Timeout { .. } | Self::Deserialization(_) | Self::Other(_)
        )
    }
}

fn summarize(errors: &[ApiError]) -> String {
    if errors.is_empty() {
        return "no error details".into();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}
