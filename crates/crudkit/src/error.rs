//! Error taxonomy for the dispatch pipeline.
//!
//! [`ClientError`] is what every dispatcher entry point returns on failure.
//! [`ErrorKind`] collapses the variants into the classification callers
//! branch on. [`TransportError`] describes a single physical attempt and is
//! what the retry driver inspects to decide whether to try again.

use std::time::Duration;

use thiserror::Error;

use crate::routing::Operation;

/// Convenience alias used across the crate.
pub type ClientResult<T> = Result<T, ClientError>;

/// Classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required argument was missing or a request was reused.
    ContractViolation,
    /// The client configuration is missing a key, version, or beta setting.
    Configuration,
    /// No route template, or an unresolved `{ver}` token.
    Route,
    /// The transport failed, possibly after retries.
    Transport,
    /// The call was cancelled through its cancellation token.
    Cancelled,
    /// The response body did not match the expected shape.
    Deserialization,
    /// The provider returned a structured error.
    Provider,
}

/// Errors surfaced by the dispatcher.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("{api}: no API key configured")]
    NoApiKey { api: String },

    #[error("{api}: beta headers requested but none configured")]
    NoBetaHeader { api: String },

    #[error("{api}: beta path requested but no beta version configured")]
    NoBetaVersion { api: String },

    #[error("{api}: version path requested but no version configured")]
    NoVersion { api: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no route defined for {operation} on {service}")]
    RouteNotDefined { operation: Operation, service: String },

    #[error("unresolved version placeholder in '{url}'")]
    UnresolvedVersion { url: String },

    #[error("request failed after {attempts} attempt(s): {source}")]
    RequestFailed {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("failed to deserialize {type_name}: {reason}")]
    Deserialization { type_name: String, reason: String },

    #[error("{api} error: {message}")]
    Provider {
        api: String,
        message: String,
        status: Option<u16>,
    },
}

impl ClientError {
    /// The classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::ContractViolation(_) => ErrorKind::ContractViolation,
            ClientError::NoApiKey { .. }
            | ClientError::NoBetaHeader { .. }
            | ClientError::NoBetaVersion { .. }
            | ClientError::NoVersion { .. }
            | ClientError::InvalidConfig(_) => ErrorKind::Configuration,
            ClientError::RouteNotDefined { .. } | ClientError::UnresolvedVersion { .. } => {
                ErrorKind::Route
            }
            ClientError::RequestFailed { .. } => ErrorKind::Transport,
            ClientError::Cancelled => ErrorKind::Cancelled,
            ClientError::Deserialization { .. } => ErrorKind::Deserialization,
            ClientError::Provider { .. } => ErrorKind::Provider,
        }
    }

    /// Whether this error points at a caller or configuration bug rather
    /// than a runtime condition.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ContractViolation | ErrorKind::Configuration | ErrorKind::Route
        )
    }

    pub(crate) fn contract(message: impl Into<String>) -> Self {
        ClientError::ContractViolation(message.into())
    }
}

/// Failure of one physical transport attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("failed to process response data: {0}")]
    DataProcessing(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("cancelled")]
    Cancelled,
}

/// HTTP statuses worth another attempt.
const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

impl TransportError {
    /// Whether the retry driver should try again after this failure.
    ///
    /// Connection, protocol, data-processing, and timeout failures are
    /// retried, as are 429 and the transient 5xx statuses. Everything else,
    /// including 400/401/403/404, is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connection(_)
            | TransportError::Protocol(_)
            | TransportError::DataProcessing(_)
            | TransportError::Timeout(_) => true,
            TransportError::Status { status, .. } => TRANSIENT_STATUSES.contains(status),
            TransportError::Cancelled => false,
        }
    }

    /// HTTP status carried by this failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classes_are_retryable() {
        assert!(TransportError::Connection("reset".into()).is_retryable());
        assert!(TransportError::Protocol("bad frame".into()).is_retryable());
        assert!(TransportError::DataProcessing("eof".into()).is_retryable());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn transient_statuses_are_retryable() {
        for status in [429, 500, 502, 503, 504] {
            let err = TransportError::Status {
                status,
                body: String::new(),
            };
            assert!(err.is_retryable(), "{status} should be retryable");
        }
    }

    #[test]
    fn client_statuses_are_terminal() {
        for status in [400, 401, 403, 404, 422] {
            let err = TransportError::Status {
                status,
                body: String::new(),
            };
            assert!(!err.is_retryable(), "{status} should be terminal");
        }
        assert!(!TransportError::Cancelled.is_retryable());
    }

    #[test]
    fn kinds_group_variants() {
        assert_eq!(
            ClientError::contract("missing body").kind(),
            ErrorKind::ContractViolation
        );
        assert_eq!(
            ClientError::NoVersion { api: "x".into() }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            ClientError::UnresolvedVersion { url: "u".into() }.kind(),
            ErrorKind::Route
        );
        assert!(ClientError::NoApiKey { api: "x".into() }.is_fatal());
        assert!(!ClientError::Cancelled.is_fatal());
    }

    #[test]
    fn request_failed_message_includes_source() {
        let err = ClientError::RequestFailed {
            attempts: 3,
            source: TransportError::Connection("refused".into()),
        };
        let text = err.to_string();
        assert!(text.contains("3 attempt"));
        assert!(text.contains("refused"));
    }
}
