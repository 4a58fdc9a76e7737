//! Global attachment points wiring failures into the classifier and queue
//!
//! Four hooks, each wired once at startup: the uncaught-exception (panic)
//! hook, the unhandled-rejection path for spawned-task failures, the HTTP
//! client interceptor, and the UI-subtree failure boundary. None of them
//! ever propagates an exception back into host code.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::{Once, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::breadcrumbs::BreadcrumbCategory;
use crate::context::{ApiTiming, PerformanceSample};
use crate::error::{ErrorSource, RawError};
use crate::pipeline::ErrorPipeline;

/// Tasks longer than this get a diagnostic breadcrumb
pub const LONG_TASK_THRESHOLD: Duration = Duration::from_secs(5);

static PANIC_HOOK: Once = Once::new();

/// Install the uncaught-exception hook. Idempotent — re-attachment is a
/// no-op. The hook classifies and reports the panic, then chains to the
/// previously installed hook; it never re-raises.
pub fn install_panic_hook(pipeline: ErrorPipeline) {
    PANIC_HOOK.call_once(move || {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = info.payload().downcast_ref::<String>() {
                s.clone()
            } else {
                "panic with non-string payload".to_string()
            };
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_else(|| "unknown".to_string());
            let raw = RawError::message(format!("panic: {message}")).with_stack(location);
            pipeline.report_error(raw, ErrorSource::Uncaught, None);
            previous(info);
        }));
    });
}

/// Report a failure of a spawned task that nobody awaited — the
/// unhandled-rejection path
pub fn report_task_failure(pipeline: &ErrorPipeline, error: impl Display) -> Uuid {
    pipeline.report_error(
        RawError::message(error.to_string()),
        ErrorSource::UnhandledRejection,
        None,
    )
}

/// Watch a spawned task and report its failure (panic or cancellation)
/// through the unhandled-rejection path. Requires a tokio runtime.
pub fn watch_task<T: Send + 'static>(pipeline: ErrorPipeline, handle: JoinHandle<T>) {
    tokio::spawn(async move {
        if let Err(join_error) = handle.await {
            report_task_failure(&pipeline, join_error);
        }
    });
}

/// Summary of one outbound HTTP call
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub method: String,
    pub url: String,
}

/// Outcome of one outbound HTTP call as seen by the client layer
#[derive(Debug, Clone)]
pub enum HttpOutcome {
    /// A response arrived, successful or not
    Response {
        status: u16,
        retry_after: Option<String>,
        duration_ms: u64,
    },
    /// The transport failed before any response arrived
    Transport {
        message: String,
        timed_out: bool,
        duration_ms: u64,
    },
}

/// Interceptor invoked by the HTTP client layer around every outbound call.
/// Records an `http` breadcrumb regardless of outcome — success breadcrumbs
/// aid later diagnosis of failures — and classifies failures.
#[derive(Clone)]
pub struct HttpInterceptor {
    pipeline: ErrorPipeline,
}

impl HttpInterceptor {
    pub fn new(pipeline: ErrorPipeline) -> Self {
        Self { pipeline }
    }

    /// Returns the error id when the outcome classified as a failure
    pub fn on_response(&self, request: RequestSummary, outcome: HttpOutcome) -> Option<Uuid> {
        let endpoint = request.url.clone();
        match outcome {
            HttpOutcome::Response {
                status,
                retry_after,
                duration_ms,
            } => {
                let mut data = BTreeMap::new();
                data.insert("status".to_string(), serde_json::json!(status));
                data.insert("durationMs".to_string(), serde_json::json!(duration_ms));
                self.pipeline.add_breadcrumb(
                    BreadcrumbCategory::Http,
                    format!("{} {} {}", request.method, request.url, status),
                    Some(data),
                );
                self.pipeline
                    .update_performance_context(PerformanceSample::Api(ApiTiming {
                        endpoint,
                        duration_ms,
                        status_code: Some(status),
                    }));

                if status < 400 {
                    return None;
                }
                let mut raw = RawError::http_status(
                    status,
                    format!("{} {} failed with status {}", request.method, request.url, status),
                );
                if let Some(value) = retry_after {
                    raw = raw.with_retry_after(value);
                }
                Some(self.pipeline.report_error(raw, ErrorSource::Http, None))
            }
            HttpOutcome::Transport {
                message,
                timed_out,
                duration_ms,
            } => {
                let mut data = BTreeMap::new();
                data.insert("durationMs".to_string(), serde_json::json!(duration_ms));
                self.pipeline.add_breadcrumb(
                    BreadcrumbCategory::Http,
                    format!("{} {} failed: {message}", request.method, request.url),
                    Some(data),
                );
                self.pipeline
                    .update_performance_context(PerformanceSample::Api(ApiTiming {
                        endpoint,
                        duration_ms,
                        status_code: None,
                    }));

                let raw = if timed_out {
                    RawError::timeout(message)
                } else {
                    RawError::network(message)
                };
                Some(self.pipeline.report_error(raw, ErrorSource::Http, None))
            }
        }
    }
}

/// Caller-supplied renderer for the fallback view shown after a render
/// failure; receives the error id for support correlation
pub trait FallbackRenderer: Send + Sync {
    fn render(&self, error_id: Uuid);
}

impl<F> FallbackRenderer for F
where
    F: Fn(Uuid) + Send + Sync,
{
    fn render(&self, error_id: Uuid) {
        self(error_id)
    }
}

/// Boundary invoked by a UI-subtree wrapper on a synchronous render failure
pub struct UiFailureBoundary {
    pipeline: ErrorPipeline,
    fallback: RwLock<Option<Box<dyn FallbackRenderer>>>,
}

impl UiFailureBoundary {
    pub fn new(pipeline: ErrorPipeline) -> Self {
        Self {
            pipeline,
            fallback: RwLock::new(None),
        }
    }

    pub fn set_fallback_renderer(&self, renderer: Box<dyn FallbackRenderer>) {
        let mut slot = match self.fallback.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(renderer);
    }

    /// Classify and report a render-time failure, invoke the fallback
    /// renderer with the resulting id, and return it
    pub fn catch(&self, message: impl Into<String>, component_stack: &str) -> Uuid {
        let raw = RawError::message(message).with_stack(component_stack);
        let error_id = self.pipeline.report_error(raw, ErrorSource::Render, None);

        let slot = match self.fallback.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(renderer) = slot.as_ref() {
            renderer.render(error_id);
        }
        error_id
    }
}

/// Scope guard for long-task detection. Records a diagnostic breadcrumb if
/// the guarded section outlives the threshold; never classified as an error.
pub struct LongTaskGuard {
    pipeline: ErrorPipeline,
    label: String,
    threshold: Duration,
    started: Instant,
}

impl LongTaskGuard {
    pub fn new(pipeline: ErrorPipeline, label: impl Into<String>) -> Self {
        Self::with_threshold(pipeline, label, LONG_TASK_THRESHOLD)
    }

    pub fn with_threshold(
        pipeline: ErrorPipeline,
        label: impl Into<String>,
        threshold: Duration,
    ) -> Self {
        Self {
            pipeline,
            label: label.into(),
            threshold,
            started: Instant::now(),
        }
    }
}

impl Drop for LongTaskGuard {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        if elapsed < self.threshold {
            return;
        }
        let mut data = BTreeMap::new();
        data.insert(
            "durationMs".to_string(),
            serde_json::json!(elapsed.as_millis() as u64),
        );
        data.insert("flavor".to_string(), serde_json::json!("performance"));
        self.pipeline.add_breadcrumb(
            BreadcrumbCategory::Custom,
            format!("long task: {}", self.label),
            Some(data),
        );
    }
}
