//! The pipeline facade and its process-wide singleton
//!
//! Composes the logger, breadcrumb recorder, context collector, classifier,
//! and reporting queue behind the public contract. The singleton is created
//! lazily on first access and never implicitly reinitialized; tests and
//! embedded hosts can instead construct an [`ErrorPipeline`] explicitly.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use uuid::Uuid;

use crate::breadcrumbs::{BreadcrumbCategory, BreadcrumbRecorder};
use crate::config::{ConfigManager, ConfigPatch, EnvPreset, ReportingConfig};
use crate::context::{ContextCollector, EnvironmentHints, PerformanceSample, UserContext};
use crate::error::classifier::{Classification, Classifier, UserMessageSink};
use crate::error::{ErrorSource, RawError};
use crate::interceptors::{self, HttpInterceptor, LongTaskGuard, UiFailureBoundary};
use crate::logger::{self, LogLevel, RingLogger};
use crate::reporting::QueueStatistics;
use crate::reporting::queue::ReportingQueue;

/// The error handling and reporting pipeline
#[derive(Clone)]
pub struct ErrorPipeline {
    logger: Arc<RingLogger>,
    breadcrumbs: Arc<BreadcrumbRecorder>,
    context: Arc<ContextCollector>,
    config: Arc<ConfigManager>,
    classifier: Arc<Classifier>,
    queue: Arc<ReportingQueue>,
}

impl ErrorPipeline {
    /// Build a pipeline over the process-wide logger
    pub fn new(config: ReportingConfig) -> Self {
        Self::with_logger(config, logger::global())
    }

    /// Build a pipeline over an explicit logger handle. Used by tests that
    /// assert on log contents.
    pub fn with_logger(config: ReportingConfig, logger: Arc<RingLogger>) -> Self {
        let breadcrumbs = Arc::new(BreadcrumbRecorder::new(config.max_breadcrumbs));
        let context = Arc::new(ContextCollector::new());
        let config = Arc::new(ConfigManager::new(config));
        let classifier = Arc::new(Classifier::new(Arc::clone(&logger)));
        let queue = ReportingQueue::new(
            Arc::clone(&config),
            Arc::clone(&breadcrumbs),
            Arc::clone(&context),
            Arc::clone(&logger),
        );
        Self {
            logger,
            breadcrumbs,
            context,
            config,
            classifier,
            queue,
        }
    }

    /// Classify and report a failure. Returns the error id. Never throws:
    /// any failure inside the pipeline degrades to local-only logging.
    pub fn report_error(
        &self,
        raw: impl Into<RawError>,
        source: ErrorSource,
        context: Option<BTreeMap<String, serde_json::Value>>,
    ) -> Uuid {
        let raw = raw.into();

        // Self-reporting guard: an error surfacing while a batch is being
        // handed to backends stays local, never re-enters the queue.
        if self.queue.is_dispatching() {
            let id = Uuid::new_v4();
            self.logger.log(
                LogLevel::Error,
                format!("error reported during dispatch, kept local: {}", raw.message),
                None,
                None,
            );
            return id;
        }

        let mut classification = self.classifier.classify(raw, source);
        if let Some(extra) = context {
            classification.record.context.extend(extra);
        }
        self.classifier.surface(&classification);
        self.queue.report(classification.record)
    }

    /// Classify without enqueueing, for callers that drive their own
    /// retry/redirect handling from the returned action
    pub fn classify(&self, raw: impl Into<RawError>, source: ErrorSource) -> Classification {
        self.classifier.classify(raw.into(), source)
    }

    pub fn add_breadcrumb(
        &self,
        category: BreadcrumbCategory,
        message: impl Into<String>,
        data: Option<BTreeMap<String, serde_json::Value>>,
    ) {
        self.breadcrumbs.record(category, message, data);
    }

    pub fn set_user_context(&self, partial: UserContext) {
        self.context.set_user(partial);
    }

    pub fn update_environment(&self, hints: EnvironmentHints) {
        self.context.update_environment(hints);
    }

    pub fn update_performance_context(&self, sample: PerformanceSample) {
        self.context.update_performance(sample);
    }

    /// Flush queued records and await delivery, bounded by the configured
    /// deadline. For teardown hooks.
    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    pub fn get_config(&self) -> ReportingConfig {
        self.config.get()
    }

    /// Merge a partial config update into the live singleton and propagate
    /// the knobs other components cache
    pub fn update_config(&self, patch: ConfigPatch) {
        self.config.update(patch);
        let config = self.config.get();
        self.breadcrumbs.set_limit(config.max_breadcrumbs);
        self.queue.reload_backends();
    }

    pub fn statistics(&self) -> QueueStatistics {
        self.queue.statistics()
    }

    /// Install the caller-supplied sink that surfaces user messages
    pub fn set_user_message_sink(&self, sink: Box<dyn UserMessageSink>) {
        self.classifier.set_sink(sink);
    }

    /// Wire the uncaught-exception hook. Idempotent.
    pub fn install_panic_hook(&self) {
        interceptors::install_panic_hook(self.clone());
    }

    /// Interceptor handle for the HTTP client layer
    pub fn http_interceptor(&self) -> HttpInterceptor {
        HttpInterceptor::new(self.clone())
    }

    /// Boundary handle for a UI-subtree wrapper
    pub fn ui_boundary(&self) -> UiFailureBoundary {
        UiFailureBoundary::new(self.clone())
    }

    /// Scope guard for long-task detection
    pub fn long_task_guard(&self, label: impl Into<String>) -> LongTaskGuard {
        LongTaskGuard::new(self.clone(), label)
    }

    /// The logger this pipeline writes through
    pub fn logger(&self) -> Arc<RingLogger> {
        Arc::clone(&self.logger)
    }

    pub(crate) fn queue(&self) -> Arc<ReportingQueue> {
        Arc::clone(&self.queue)
    }

    pub(crate) fn breadcrumbs(&self) -> Arc<BreadcrumbRecorder> {
        Arc::clone(&self.breadcrumbs)
    }

    pub(crate) fn context(&self) -> Arc<ContextCollector> {
        Arc::clone(&self.context)
    }
}

static PIPELINE: OnceCell<ErrorPipeline> = OnceCell::new();

/// Install the process-wide pipeline. Idempotent: the first call selects
/// the preset (explicit argument, else the environment flag) and wires the
/// startup hooks; later calls return the existing instance.
pub fn install(preset: Option<EnvPreset>) -> &'static ErrorPipeline {
    PIPELINE.get_or_init(|| {
        let preset = preset.unwrap_or_else(EnvPreset::from_env);
        let pipeline = ErrorPipeline::new(ReportingConfig::preset(preset));
        pipeline.install_panic_hook();
        pipeline.queue().start_timer();
        pipeline
            .logger()
            .info(format!("error pipeline installed with {preset:?} preset"));
        pipeline
    })
}

/// The process-wide pipeline, created lazily on first access
pub fn get() -> &'static ErrorPipeline {
    install(None)
}

/// Report a manually caught failure from anywhere in the host application
pub fn report_error(
    raw: impl Into<RawError>,
    source: ErrorSource,
    context: Option<BTreeMap<String, serde_json::Value>>,
) -> Uuid {
    get().report_error(raw, source, context)
}

pub fn add_breadcrumb(
    category: BreadcrumbCategory,
    message: impl Into<String>,
    data: Option<BTreeMap<String, serde_json::Value>>,
) {
    get().add_breadcrumb(category, message, data);
}

pub fn set_user_context(partial: UserContext) {
    get().set_user_context(partial);
}

pub fn update_performance_context(sample: PerformanceSample) {
    get().update_performance_context(sample);
}

/// Teardown hook: flush queued records, bounded by the configured deadline
pub async fn flush() {
    get().flush().await;
}

pub fn get_config() -> ReportingConfig {
    get().get_config()
}

pub fn update_config(patch: ConfigPatch) {
    get().update_config(patch);
}
