//! Maps a raw failure into a typed record plus a user-facing outcome
//!
//! Classification is an ordered, first-match-wins rule chain over the shape
//! of the raw error. It is total: any input, however malformed, produces a
//! record (`Unknown` at worst) and it never panics — a failure while
//! classifying degrades to the `Unknown` path with a best-effort message.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, ErrorRecord, ErrorSeverity, ErrorSource, RawError};
use crate::logger::{LogLevel, RingLogger};

/// Backoff seed used when a rate-limited response carries no `Retry-After`
pub const RATE_LIMIT_BACKOFF_SEED_MS: u64 = 1_000;

/// Number of field errors summarized into the validation user message
const VALIDATION_SUMMARY_FIELDS: usize = 3;

/// What the calling code should do about a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryAction {
    Retry,
    Redirect,
    Fail,
    None,
}

/// Result of classifying one raw failure
#[derive(Debug, Clone)]
pub struct Classification {
    pub record: ErrorRecord,
    pub user_message: String,
    pub action: RecoveryAction,
    pub retry_delay: Option<Duration>,
}

/// Caller-supplied sink used to surface user messages (e.g. a toast).
/// The pipeline does not render UI itself.
pub trait UserMessageSink: Send + Sync {
    fn show(&self, message: &str, severity: ErrorSeverity);
}

impl<F> UserMessageSink for F
where
    F: Fn(&str, ErrorSeverity) + Send + Sync,
{
    fn show(&self, message: &str, severity: ErrorSeverity) {
        self(message, severity)
    }
}

/// The error classifier
pub struct Classifier {
    logger: Arc<RingLogger>,
    sink: RwLock<Option<Box<dyn UserMessageSink>>>,
}

impl Classifier {
    pub fn new(logger: Arc<RingLogger>) -> Self {
        Self {
            logger,
            sink: RwLock::new(None),
        }
    }

    /// Install the user-message sink
    pub fn set_sink(&self, sink: Box<dyn UserMessageSink>) {
        let mut slot = match self.sink.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(sink);
    }

    /// Classify a raw failure. Always logs the outcome locally.
    pub fn classify(&self, raw: RawError, source: ErrorSource) -> Classification {
        let classification = catch_unwind(AssertUnwindSafe(|| classify_shape(&raw, source)))
            .unwrap_or_else(|_| {
                self.logger.log(
                    LogLevel::Fatal,
                    "classifier failed on its own input, degrading to Unknown",
                    Some(&raw.message),
                    None,
                );
                unknown_classification(&raw)
            });

        let mut context = BTreeMap::new();
        context.insert(
            "errorId".to_string(),
            serde_json::Value::String(classification.record.id.to_string()),
        );
        context.insert(
            "kind".to_string(),
            serde_json::Value::String(classification.record.kind.to_string()),
        );
        context.insert(
            "source".to_string(),
            serde_json::Value::String(source.to_string()),
        );
        let level = match classification.record.severity {
            ErrorSeverity::Fatal => LogLevel::Fatal,
            ErrorSeverity::Error => LogLevel::Error,
            ErrorSeverity::Warning => LogLevel::Warn,
        };
        self.logger.log(
            level,
            classification.record.message.clone(),
            Some(&classification.record.raw.message),
            Some(context),
        );

        classification
    }

    /// Surface the user message through the installed sink, unless a caller
    /// already displayed one for this failure
    pub fn surface(&self, classification: &Classification) {
        if classification.record.handled_locally {
            return;
        }
        let slot = match self.sink.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(sink) = slot.as_ref() {
            sink.show(&classification.user_message, classification.record.severity);
        }
    }
}

// Ordered rule chain, first match wins:
//   1. upstream kind tag
//   2. HTTP status / transport shape
//   3. field-level validation payload
//   4. render-time failure
//   5. Unknown
fn classify_shape(raw: &RawError, source: ErrorSource) -> Classification {
    if let Some(kind) = raw.kind_tag {
        return build(raw, kind, default_action(kind), rate_limit_delay_for(raw, kind));
    }

    if let Some(status) = raw.status {
        let (kind, action) = match status {
            401 => (ErrorKind::Auth, RecoveryAction::Redirect),
            403 => (ErrorKind::Permission, RecoveryAction::Fail),
            408 => (ErrorKind::Timeout, RecoveryAction::Retry),
            429 => (ErrorKind::RateLimited, RecoveryAction::Retry),
            500..=599 => (ErrorKind::Api, RecoveryAction::Retry),
            400..=499 => (ErrorKind::Api, RecoveryAction::Fail),
            _ => (ErrorKind::Api, RecoveryAction::Fail),
        };
        return build(raw, kind, action, rate_limit_delay_for(raw, kind));
    }

    if raw.timed_out {
        return build(raw, ErrorKind::Timeout, RecoveryAction::Retry, None);
    }

    if raw.network_failure {
        return build(raw, ErrorKind::Network, RecoveryAction::Retry, None);
    }

    if raw.field_errors.as_ref().is_some_and(|f| !f.is_empty()) {
        return build(raw, ErrorKind::Validation, RecoveryAction::None, None);
    }

    if source == ErrorSource::Render {
        return build(raw, ErrorKind::RenderFailure, RecoveryAction::Fail, None);
    }

    unknown_classification(raw)
}

fn unknown_classification(raw: &RawError) -> Classification {
    build(raw, ErrorKind::Unknown, RecoveryAction::Fail, None)
}

fn build(
    raw: &RawError,
    kind: ErrorKind,
    action: RecoveryAction,
    retry_delay: Option<Duration>,
) -> Classification {
    let record = ErrorRecord {
        id: Uuid::new_v4(),
        kind,
        message: summary_for(raw, kind),
        raw: raw.clone(),
        context: BTreeMap::new(),
        severity: kind.severity(),
        occurred_at: Utc::now(),
        handled_locally: raw.handled_locally,
    };
    let user_message = user_message_for(&record);
    Classification {
        record,
        user_message,
        action,
        retry_delay,
    }
}

fn default_action(kind: ErrorKind) -> RecoveryAction {
    match kind {
        ErrorKind::Validation => RecoveryAction::None,
        ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimited => RecoveryAction::Retry,
        ErrorKind::Auth => RecoveryAction::Redirect,
        _ => RecoveryAction::Fail,
    }
}

// Retry delay applies only to rate-limited failures: honour `Retry-After`
// seconds when present, otherwise seed exponential backoff.
fn rate_limit_delay_for(raw: &RawError, kind: ErrorKind) -> Option<Duration> {
    if kind != ErrorKind::RateLimited {
        return None;
    }
    let delay_ms = raw
        .retry_after
        .as_deref()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|seconds| seconds * 1_000)
        .unwrap_or(RATE_LIMIT_BACKOFF_SEED_MS);
    Some(Duration::from_millis(delay_ms))
}

fn summary_for(raw: &RawError, kind: ErrorKind) -> String {
    if !raw.message.trim().is_empty() {
        return raw.message.clone();
    }
    match kind {
        ErrorKind::Validation => "submitted data failed validation".to_string(),
        ErrorKind::Network => "network request failed without a response".to_string(),
        ErrorKind::Api => format!("API request failed with status {}", raw.status.unwrap_or(0)),
        ErrorKind::Auth => "authentication required".to_string(),
        ErrorKind::Permission => "operation not permitted".to_string(),
        ErrorKind::RenderFailure => "a view failed to render".to_string(),
        ErrorKind::Timeout => "request exceeded its deadline".to_string(),
        ErrorKind::RateLimited => "request was rate limited".to_string(),
        ErrorKind::Unknown => "an unexpected error occurred".to_string(),
    }
}

fn user_message_for(record: &ErrorRecord) -> String {
    match record.kind {
        ErrorKind::Validation => {
            let fields = record
                .raw
                .field_errors
                .as_ref()
                .map(|field_errors| {
                    field_errors
                        .iter()
                        .take(VALIDATION_SUMMARY_FIELDS)
                        .map(|(field, errors)| match errors.first() {
                            Some(first) => format!("{field}: {first}"),
                            None => field.clone(),
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            if fields.is_empty() {
                "Some of the information you provided is invalid. Please review the form.".to_string()
            } else {
                format!("Please review the following fields: {fields}")
            }
        }
        ErrorKind::Network => {
            "Connection problem. Please check your network and try again.".to_string()
        }
        ErrorKind::Api => {
            "The service had a problem handling your request. Please try again.".to_string()
        }
        ErrorKind::Auth => "Your session has expired. Please sign in again.".to_string(),
        ErrorKind::Permission => "You don't have permission to perform this action.".to_string(),
        ErrorKind::RenderFailure => format!(
            "Something went wrong displaying this page. Reference: {}",
            record.id
        ),
        ErrorKind::Timeout => "The request took too long. Please try again.".to_string(),
        ErrorKind::RateLimited => {
            "Too many requests. Please wait a moment and try again.".to_string()
        }
        ErrorKind::Unknown => "Something went wrong. Please try again.".to_string(),
    }
}
