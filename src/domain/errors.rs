//! # Error Taxonomy
//!
//! Failures of outbound calls, and how the delivery retrier should treat each of them.

use std::time::Duration;

/// How the retrier treats a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeouts, resets, 5xx: try again after backoff.
    Retryable,
    /// Definite client error (400/401/403/404): never retried.
    Terminal,
    /// 429: stop immediately and surface the suggested wait.
    RateLimited(Option<Duration>),
}

/// Implemented by every error the retrier may see.
pub trait Classify {
    fn classify(&self) -> FailureKind;
}

/// Maps an HTTP-equivalent status onto a retry class.
pub fn classify_status(status: u16, retry_after: Option<Duration>) -> FailureKind {
    match status {
        400 | 401 | 403 | 404 => FailureKind::Terminal,
        429 => FailureKind::RateLimited(retry_after),
        _ => FailureKind::Retryable,
    }
}

/// Outbound send failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeliveryError {
    #[error("transient transport error: {0}")]
    Transient(String),

    #[error("request rejected ({status}): {message}")]
    Terminal { status: u16, message: String },

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("session terminated: {0}")]
    SessionTerminal(String),

    #[error("no live transport session")]
    NotConnected,
}

impl DeliveryError {
    /// Builds the variant matching an HTTP-equivalent status.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        match classify_status(status, retry_after) {
            FailureKind::Terminal => DeliveryError::Terminal {
                status,
                message: message.into(),
            },
            FailureKind::RateLimited(retry_after) => DeliveryError::RateLimited { retry_after },
            FailureKind::Retryable => DeliveryError::Transient(message.into()),
        }
    }
}

impl Classify for DeliveryError {
    fn classify(&self) -> FailureKind {
        match self {
            DeliveryError::Transient(_) | DeliveryError::NotConnected => FailureKind::Retryable,
            DeliveryError::Terminal { .. } | DeliveryError::SessionTerminal(_) => FailureKind::Terminal,
            DeliveryError::RateLimited { retry_after } => FailureKind::RateLimited(*retry_after),
        }
    }
}

/// Failures of the transport's connect/confirm calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("credential rejected: {0}")]
    InvalidCredential(String),

    #[error("no credential challenge is pending")]
    NoPendingChallenge,

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Whether the connect failure must tear the session down instead of reconnecting.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportError::InvalidCredential(_))
    }
}

/// Failure of the content-generation collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[{source_name}] {message}")]
pub struct ResponderError {
    pub source_name: String,
    pub message: String,
    /// HTTP-equivalent status when the collaborator reported one.
    pub status: Option<u16>,
    pub retry_after: Option<Duration>,
}

impl ResponderError {
    pub fn new(source_name: &str, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.to_string(),
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl Classify for ResponderError {
    fn classify(&self) -> FailureKind {
        match self.status {
            Some(status) => classify_status(status, self.retry_after),
            None => FailureKind::Retryable,
        }
    }
}

/// Failure of a media/content provider lookup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("content lookup failed: {0}")]
pub struct ContentError(pub String);
