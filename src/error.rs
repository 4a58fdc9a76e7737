use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// Error modules
pub mod classifier;

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Fatal errors reserved for pipeline-internal invariant violations
    Fatal,
    /// Errors that affect the current operation
    Error,
    /// Warnings the user can usually recover from on their own
    Warning,
}

impl Default for ErrorSeverity {
    fn default() -> Self {
        Self::Error
    }
}

impl Display for ErrorSeverity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// Error kind for taxonomic classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Errors caused by invalid user input, carrying field-level detail
    Validation,
    /// Network-level failures where no HTTP response was received
    Network,
    /// HTTP responses with a failure status that is not auth-related
    Api,
    /// Authentication failures (HTTP 401)
    Auth,
    /// Authorization failures (HTTP 403)
    Permission,
    /// Synchronous failures caught while rendering a UI subtree
    RenderFailure,
    /// Requests that exceeded their deadline
    Timeout,
    /// Requests rejected by server-side rate limiting (HTTP 429)
    RateLimited,
    /// Failures that don't fit into other kinds
    Unknown,
}

impl Default for ErrorKind {
    fn default() -> Self {
        Self::Unknown
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "Validation"),
            Self::Network => write!(f, "Network"),
            Self::Api => write!(f, "Api"),
            Self::Auth => write!(f, "Auth"),
            Self::Permission => write!(f, "Permission"),
            Self::RenderFailure => write!(f, "RenderFailure"),
            Self::Timeout => write!(f, "Timeout"),
            Self::RateLimited => write!(f, "RateLimited"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl ErrorKind {
    /// Severity used for local logging and user-facing surfacing of this kind
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Validation => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Where a failure was intercepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorSource {
    /// Uncaught exception hook (panic hook)
    Uncaught,
    /// Failure of a spawned task that nobody awaited
    UnhandledRejection,
    /// HTTP client interceptor
    Http,
    /// UI-subtree failure boundary
    Render,
    /// Manually reported by host application code
    Manual,
}

impl Display for ErrorSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uncaught => write!(f, "uncaught"),
            Self::UnhandledRejection => write!(f, "unhandledRejection"),
            Self::Http => write!(f, "http"),
            Self::Render => write!(f, "render"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// The original failure payload, opaque to everything downstream of the
/// classifier. Built from whatever shape the interceptors hand over; every
/// field is optional so classification is total.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawError {
    /// Human-readable message of the original failure
    pub message: String,
    /// Stack text, if the source captured one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// HTTP status code, for failures that carry a response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Raw `Retry-After` header value, if the response carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<String>,
    /// Field-level validation failures, keyed by field name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<BTreeMap<String, Vec<String>>>,
    /// Kind assigned by an upstream caller; preserved over shape inspection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind_tag: Option<ErrorKind>,
    /// True when the transport failed before any response arrived
    #[serde(default)]
    pub network_failure: bool,
    /// True when the failure was a client-side deadline expiry
    #[serde(default)]
    pub timed_out: bool,
    /// True when the caller already surfaced a message for this failure
    #[serde(default)]
    pub handled_locally: bool,
}

impl RawError {
    /// Create a raw error from a plain message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Create a raw error for an HTTP response with a failure status
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
            ..Default::default()
        }
    }

    /// Create a raw error for a transport-level failure with no response
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            network_failure: true,
            ..Default::default()
        }
    }

    /// Create a raw error for a client-side deadline expiry
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: true,
            ..Default::default()
        }
    }

    /// Create a raw error carrying field-level validation failures
    pub fn validation(field_errors: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            message: "validation failed".to_string(),
            field_errors: Some(field_errors),
            ..Default::default()
        }
    }

    /// Create a raw error with a kind already assigned by the caller
    pub fn tagged(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind_tag: Some(kind),
            ..Default::default()
        }
    }

    /// Set the raw `Retry-After` header value
    pub fn with_retry_after(mut self, value: impl Into<String>) -> Self {
        self.retry_after = Some(value.into());
        self
    }

    /// Attach stack text
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Mark that the caller already displayed a message for this failure
    pub fn with_handled_locally(mut self, handled: bool) -> Self {
        self.handled_locally = handled;
        self
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        Self::message(message)
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        Self::message(message)
    }
}

/// One classified failure. Created by the classifier, consumed exactly once
/// by the reporting queue, never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Unique identifier, generated at classification time
    pub id: Uuid,
    /// Classified kind; always set, defaults to `Unknown`
    pub kind: ErrorKind,
    /// Human-readable summary, never raw stack text alone
    pub message: String,
    /// The original failure payload
    pub raw: RawError,
    /// Caller-supplied diagnostic fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
    /// Severity derived from the kind
    pub severity: ErrorSeverity,
    /// Timestamp of classification
    pub occurred_at: DateTime<Utc>,
    /// True if a caller already displayed a message for this failure
    pub handled_locally: bool,
}

/// Failures of the pipeline itself. These never propagate into host
/// application code; public entry points catch them and degrade to
/// local-only logging.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("backend '{name}' rejected batch: {reason}")]
    BackendRejected { name: String, reason: String },
    #[error("HTTP dispatch error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = PipelineError> = core::result::Result<T, E>;
