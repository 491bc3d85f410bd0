//! Error types for Courier.
//!
//! This module provides the [`CourierError`] type, the standard error type
//! used throughout the Courier workspace.
//!
//! | [`ErrorCategory`] | Raised when | Retryable |
//! |---|---|---|
//! | `Configuration` | wiring is invalid (missing DSN parameter, duplicate route) | no |
//! | `Transport` | the broker or queue failed to publish/fetch | yes |
//! | `Logic` | a programming mistake was detected (query without single result) | no |
//! | `Handler` | a handler failed or no handler exists | yes |
//! | `Serialization` | an envelope could not be encoded or decoded | no |

use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// A boxed, thread-safe error, as produced by handlers and external stores.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type alias using [`CourierError`].
pub type CourierResult<T> = Result<T, CourierError>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid configuration, detected at construction time.
    Configuration,
    /// Transport I/O failure.
    Transport,
    /// Programming or configuration mistake detected at dispatch time.
    Logic,
    /// Handler failure.
    Handler,
    /// Envelope encoding or decoding failure.
    Serialization,
}

impl ErrorCategory {
    /// Returns true if a retry policy may reasonably redeliver the message.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transport | Self::Handler)
    }

    /// Returns the stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Transport => "transport",
            Self::Logic => "logic",
            Self::Handler => "handler",
            Self::Serialization => "serialization",
        }
    }
}

/// A failure reported by one handler.
#[derive(Debug)]
pub struct HandlerFailure {
    /// The handler identifier.
    pub handler: String,
    /// The error it returned.
    pub error: BoxError,
}

impl HandlerFailure {
    /// Creates a handler failure.
    pub fn new(handler: impl Into<String>, error: impl Into<BoxError>) -> Self {
        Self {
            handler: handler.into(),
            error: error.into(),
        }
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.handler, self.error)
    }
}

/// Standard error type for Courier.
#[derive(Error, Debug)]
pub enum CourierError {
    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Transport failure; the original cause is preserved.
    #[error("Transport error: {message}")]
    Transport {
        /// Human-readable error message.
        message: String,
        /// The underlying I/O or client error.
        #[source]
        source: Option<BoxError>,
    },

    /// A logical error that must not be retried.
    #[error("Logic error: {message}")]
    Logic {
        /// Human-readable error message.
        message: String,
    },

    /// No handler exists for the message.
    #[error("No handler for message \"{message_name}\"")]
    NoHandler {
        /// The unhandled message type.
        message_name: String,
    },

    /// One or more handlers failed.
    #[error("Handling \"{message_name}\" failed: {}", summarize(.failures))]
    HandlerFailed {
        /// The message type being handled.
        message_name: String,
        /// Every handler failure, in invocation order.
        failures: Vec<HandlerFailure>,
    },

    /// Encoding or decoding failed.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message.
        message: String,
        /// The underlying serde error.
        #[source]
        source: Option<serde_json::Error>,
    },
}

fn summarize(failures: &[HandlerFailure]) -> String {
    match failures {
        [] => "no failure recorded".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

impl CourierError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a transport error without an underlying cause.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error wrapping its cause.
    #[must_use]
    pub fn transport_with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a logic error.
    #[must_use]
    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a serialization error wrapping a serde error.
    #[must_use]
    pub fn serialization_with_source(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::Configuration,
            Self::Transport { .. } => ErrorCategory::Transport,
            Self::Logic { .. } => ErrorCategory::Logic,
            Self::NoHandler { .. } | Self::HandlerFailed { .. } => ErrorCategory::Handler,
            Self::Serialization { .. } => ErrorCategory::Serialization,
        }
    }

    /// Returns true if the failure may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Returns the direct causes of this error, in wrap order.
    ///
    /// A [`HandlerFailed`](Self::HandlerFailed) error has one cause per failed
    /// handler; other variants have at most one.
    #[must_use]
    pub fn causes(&self) -> Vec<&(dyn StdError + 'static)> {
        match self {
            Self::HandlerFailed { failures, .. } => failures
                .iter()
                .map(|failure| failure.error.as_ref() as &(dyn StdError + 'static))
                .collect(),
            Self::Transport {
                source: Some(source),
                ..
            } => vec![source.as_ref() as &(dyn StdError + 'static)],
            Self::Serialization {
                source: Some(source),
                ..
            } => vec![source as &(dyn StdError + 'static)],
            _ => Vec::new(),
        }
    }
}

/// A failed HTTP exchange, as raised by handlers that call remote services.
///
/// Carries the response status and headers so that retry policies can honor
/// `retry-after`.
#[derive(Error, Debug, Clone)]
#[error("HTTP {status}: {message}")]
pub struct HttpStatusError {
    /// Response status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Human-readable error message.
    pub message: String,
}

impl HttpStatusError {
    /// Creates an HTTP status error without headers.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            message: message.into(),
        }
    }

    /// Adds a response header. Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CourierError::config("stream is required");
        assert_eq!(err.to_string(), "Configuration error: stream is required");

        let err = CourierError::NoHandler {
            message_name: "Ping".into(),
        };
        assert_eq!(err.to_string(), "No handler for message \"Ping\"");
    }

    #[test]
    fn test_handler_failed_summary() {
        let err = CourierError::HandlerFailed {
            message_name: "Ping".into(),
            failures: vec![
                HandlerFailure::new("first", "boom"),
                HandlerFailure::new("second", "bang"),
            ],
        };
        assert_eq!(err.to_string(), "Handling \"Ping\" failed: first: boom (and 1 more)");
        assert_eq!(err.causes().len(), 2);
    }

    #[test]
    fn test_categories() {
        assert_eq!(CourierError::transport("x").category(), ErrorCategory::Transport);
        assert_eq!(CourierError::logic("x").category(), ErrorCategory::Logic);
        assert!(CourierError::transport("x").is_retryable());
        assert!(!CourierError::config("x").is_retryable());
        assert!(!CourierError::logic("x").is_retryable());
    }

    #[test]
    fn test_transport_source_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = CourierError::transport_with_source("publish failed", io);
        let source = err.source().expect("source is kept");
        assert_eq!(source.to_string(), "reset");
        assert_eq!(err.causes().len(), 1);
    }

    #[test]
    fn test_http_status_error_headers() {
        let err = HttpStatusError::new(StatusCode::TOO_MANY_REQUESTS, "slow down")
            .with_header("retry-after", "3");
        assert_eq!(err.headers.get("retry-after").unwrap(), "3");
        assert_eq!(err.to_string(), "HTTP 429 Too Many Requests: slow down");
    }
}
