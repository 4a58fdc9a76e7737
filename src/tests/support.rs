//! Shared fixtures for the cross-component tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::breadcrumbs::BreadcrumbRecorder;
use crate::config::{ConfigManager, PrivacyConfig, ReportingConfig, SamplingConfig};
use crate::context::ContextCollector;
use crate::error::{ErrorKind, ErrorRecord, ErrorSeverity, RawError};
use crate::logger::RingLogger;
use crate::pipeline::ErrorPipeline;
use crate::reporting::ErrorReportBatch;
use crate::reporting::backends::Backend;
use crate::reporting::queue::ReportingQueue;

/// A config that keeps the timer and sampling out of the way unless a test
/// opts in
pub fn quiet_config(batch_size: usize, max_queue_size: usize) -> ReportingConfig {
    ReportingConfig {
        batch_size,
        batch_timeout_ms: 60_000,
        max_queue_size,
        sampling: SamplingConfig {
            enabled: false,
            rate: 1.0,
        },
        max_breadcrumbs: 50,
        privacy: PrivacyConfig {
            anonymize_ip: false,
            include_username: true,
        },
        backends: Vec::new(),
        flush_deadline_ms: 2_000,
    }
}

/// A pre-classified record, for tests that drive the queue directly
pub fn classified(message: &str) -> ErrorRecord {
    ErrorRecord {
        id: Uuid::new_v4(),
        kind: ErrorKind::Api,
        message: message.to_string(),
        raw: RawError::message(message),
        context: BTreeMap::new(),
        severity: ErrorSeverity::Error,
        occurred_at: Utc::now(),
        handled_locally: false,
    }
}

pub struct QueueFixture {
    pub queue: Arc<ReportingQueue>,
    pub logger: Arc<RingLogger>,
    pub breadcrumbs: Arc<BreadcrumbRecorder>,
    pub context: Arc<ContextCollector>,
}

pub fn queue_fixture(config: ReportingConfig) -> QueueFixture {
    let logger = Arc::new(RingLogger::new(200, None));
    let breadcrumbs = Arc::new(BreadcrumbRecorder::new(config.max_breadcrumbs));
    let context = Arc::new(ContextCollector::new());
    let queue = ReportingQueue::new(
        Arc::new(ConfigManager::new(config)),
        Arc::clone(&breadcrumbs),
        Arc::clone(&context),
        Arc::clone(&logger),
    );
    QueueFixture {
        queue,
        logger,
        breadcrumbs,
        context,
    }
}

pub fn pipeline_fixture(config: ReportingConfig) -> (ErrorPipeline, Arc<RingLogger>) {
    let logger = Arc::new(RingLogger::new(200, None));
    let pipeline = ErrorPipeline::with_logger(config, Arc::clone(&logger));
    (pipeline, logger)
}

/// In-memory backend with failure injection and a shared attempt log, so
/// chain ordering can be asserted across backends
pub struct MockBackend {
    name: String,
    fail: AtomicBool,
    attempts: Arc<Mutex<Vec<String>>>,
    delivered: Mutex<Vec<ErrorReportBatch>>,
}

impl MockBackend {
    pub fn ok(name: &str, attempts: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail: AtomicBool::new(false),
            attempts,
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &str, attempts: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail: AtomicBool::new(true),
            attempts,
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn shared_attempts() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn delivered(&self) -> Vec<ErrorReportBatch> {
        self.delivered.lock().unwrap().clone()
    }
}

/// Upcast a set of mocks into a backend chain
pub fn chain(backends: &[Arc<MockBackend>]) -> Vec<Arc<dyn Backend>> {
    backends
        .iter()
        .map(|backend| Arc::clone(backend) as Arc<dyn Backend>)
        .collect()
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, batch: &ErrorReportBatch) -> Result<(), String> {
        self.attempts.lock().unwrap().push(self.name.clone());
        if self.fail.load(Ordering::SeqCst) {
            Err("induced failure".to_string())
        } else {
            self.delivered.lock().unwrap().push(batch.clone());
            Ok(())
        }
    }
}
