//! Reporting queue (batcher)
//!
//! Accepts classified records, applies sampling, accumulates batches, and
//! dispatches them to the configured backend chain. Batch lifecycle:
//! `Accumulating -> Flushing -> Delivered | Retrying | Dropped`. Telemetry
//! loss is acceptable; blocking the host application is not, so every
//! failure path here degrades to local logging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use tokio::runtime::Handle;
use uuid::Uuid;

use crate::breadcrumbs::BreadcrumbRecorder;
use crate::config::ConfigManager;
use crate::context::ContextCollector;
use crate::error::ErrorRecord;
use crate::logger::{LogLevel, RingLogger};
use crate::reporting::backends::{self, Backend};
use crate::reporting::{BatchState, ErrorReportBatch, QueueStatistics};

/// Retries after the initial dispatch attempt
pub const RETRY_CAP: u32 = 3;
/// Base of the exponential retry backoff
pub const RETRY_BACKOFF_BASE_MS: u64 = 500;

struct QueueInner {
    pending: Vec<ErrorRecord>,
    /// Start of the current accumulation window. Set when the first record
    /// of a window is enqueued, cleared on flush — never reset per enqueue,
    /// so a steady trickle of errors cannot starve flushing.
    window_started: Option<Instant>,
    /// Batches formed while no async runtime was available; drained by the
    /// next explicit flush
    parked: Vec<ErrorReportBatch>,
}

/// Process-wide reporting queue
pub struct ReportingQueue {
    this: Weak<ReportingQueue>,
    config: Arc<ConfigManager>,
    breadcrumbs: Arc<BreadcrumbRecorder>,
    context: Arc<ContextCollector>,
    logger: Arc<RingLogger>,
    inner: Mutex<QueueInner>,
    stats: Mutex<QueueStatistics>,
    backends: RwLock<Vec<Arc<dyn Backend>>>,
    dispatching: AtomicBool,
    timer_started: AtomicBool,
}

impl ReportingQueue {
    pub fn new(
        config: Arc<ConfigManager>,
        breadcrumbs: Arc<BreadcrumbRecorder>,
        context: Arc<ContextCollector>,
        logger: Arc<RingLogger>,
    ) -> Arc<Self> {
        let chain = backends::build(&config.get().backends);
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            breadcrumbs,
            context,
            logger,
            inner: Mutex::new(QueueInner {
                pending: Vec::new(),
                window_started: None,
                parked: Vec::new(),
            }),
            stats: Mutex::new(QueueStatistics::default()),
            backends: RwLock::new(chain),
            dispatching: AtomicBool::new(false),
            timer_started: AtomicBool::new(false),
        })
    }

    /// Replace the backend chain. Used by tests and after config updates.
    pub fn set_backends(&self, chain: Vec<Arc<dyn Backend>>) {
        let mut backends = match self.backends.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *backends = chain;
    }

    /// Rebuild the backend chain from the current config
    pub fn reload_backends(&self) {
        self.set_backends(backends::build(&self.config.get().backends));
    }

    /// True while a batch is being handed to backends. Reports arriving in
    /// that window from the pipeline's own dispatch path must go to the
    /// local-log-only path to avoid self-reporting recursion.
    pub fn is_dispatching(&self) -> bool {
        self.dispatching.load(Ordering::SeqCst)
    }

    /// Enqueue one classified record. Applies sampling first; sampled-out
    /// records are logged locally and counted, but never transmitted.
    /// Returns the record id either way.
    pub fn report(&self, record: ErrorRecord) -> Uuid {
        let id = record.id;
        let config = self.config.get();

        if config.sampling.enabled && !sample_in(config.sampling.rate) {
            {
                let mut stats = self.stats_lock();
                stats.records_sampled_out += 1;
            }
            self.logger
                .debug(format!("error {id} sampled out of transmission"));
            return id;
        }

        let batch = {
            let mut inner = self.inner_lock();
            inner.pending.push(record);

            while inner.pending.len() > config.max_queue_size {
                let dropped = inner.pending.remove(0);
                {
                    let mut stats = self.stats_lock();
                    stats.records_dropped += 1;
                }
                self.logger.log(
                    LogLevel::Error,
                    format!("queue full, dropped oldest record {}", dropped.id),
                    None,
                    None,
                );
            }

            if inner.pending.len() >= config.batch_size {
                self.take_batch(&mut inner)
            } else {
                if inner.window_started.is_none() {
                    inner.window_started = Some(Instant::now());
                }
                None
            }
        };

        if let Some(batch) = batch {
            self.dispatch_in_background(batch);
        }
        id
    }

    /// Flush whatever is queued right now and await delivery, bounded by
    /// the configured deadline. Intended for process/page teardown hooks —
    /// it never hangs teardown past the deadline.
    pub async fn flush(&self) {
        let deadline = Duration::from_millis(self.config.get().flush_deadline_ms.max(1));
        let batches = {
            let mut inner = self.inner_lock();
            let mut batches = std::mem::take(&mut inner.parked);
            if let Some(batch) = self.take_batch(&mut inner) {
                batches.push(batch);
            }
            batches
        };
        if batches.is_empty() {
            return;
        }
        let Some(queue) = self.this.upgrade() else {
            return;
        };

        let drain = async move {
            for batch in batches {
                Arc::clone(&queue).dispatch_with_retry(batch).await;
            }
        };
        if tokio::time::timeout(deadline, drain).await.is_err() {
            self.logger
                .warn("flush abandoned after deadline, remaining batches lost");
        }
    }

    /// Queue diagnostics. Local only, never transmitted.
    pub fn statistics(&self) -> QueueStatistics {
        let queue_depth = self.inner_lock().pending.len();
        let mut stats = self.stats_lock().clone();
        stats.queue_depth = queue_depth;
        stats
    }

    /// Start the accumulation-window watcher. Idempotent; requires a tokio
    /// runtime. Without it, only size-triggered and explicit flushes fire.
    pub fn start_timer(&self) {
        if self.timer_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            self.timer_started.store(false, Ordering::SeqCst);
            self.logger
                .warn("no async runtime available, timeout-triggered flushing disabled");
            return;
        };
        let weak = self.this.clone();
        handle.spawn(async move {
            loop {
                let Some(queue) = weak.upgrade() else {
                    break;
                };
                let timeout_ms = queue.config.get().batch_timeout_ms.max(1);
                let tick = Duration::from_millis((timeout_ms / 4).clamp(10, 1_000));
                drop(queue);
                tokio::time::sleep(tick).await;

                let Some(queue) = weak.upgrade() else {
                    break;
                };
                let batch = {
                    let mut inner = queue.inner_lock();
                    let expired = inner.window_started.is_some_and(|started| {
                        started.elapsed() >= Duration::from_millis(timeout_ms)
                    });
                    if expired {
                        queue.take_batch(&mut inner)
                    } else {
                        None
                    }
                };
                if let Some(batch) = batch {
                    queue.dispatch_in_background(batch);
                }
            }
        });
    }

    // Construct one immutable batch from everything pending, closing the
    // current accumulation window.
    fn take_batch(&self, inner: &mut QueueInner) -> Option<ErrorReportBatch> {
        if inner.pending.is_empty() {
            return None;
        }
        inner.window_started = None;
        let records = std::mem::take(&mut inner.pending);
        let config = self.config.get();
        let batch = ErrorReportBatch {
            batch_id: Uuid::new_v4(),
            created_at: Utc::now(),
            records,
            breadcrumbs: self.breadcrumbs.snapshot(),
            user: self.context.collect_user(&config.privacy),
            environment: self.context.collect_environment(),
            performance: self.context.collect_performance(),
        };
        self.logger.debug(format!(
            "batch {} with {} records moved to {}",
            batch.batch_id,
            batch.records.len(),
            BatchState::Flushing
        ));
        Some(batch)
    }

    fn dispatch_in_background(&self, batch: ErrorReportBatch) {
        let Some(queue) = self.this.upgrade() else {
            return;
        };
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { queue.dispatch_with_retry(batch).await });
            }
            Err(_) => {
                self.logger
                    .warn("no async runtime available, batch parked until next flush");
                self.inner_lock().parked.push(batch);
            }
        }
    }

    /// Walk the backend chain with the batch; on total failure retry with
    /// bounded exponential backoff, then drop. Runs on its own task, so a
    /// retrying batch never blocks formation or flush of the next one.
    pub async fn dispatch_with_retry(self: Arc<Self>, batch: ErrorReportBatch) {
        for attempt in 0..=RETRY_CAP {
            if attempt > 0 {
                let backoff_ms = RETRY_BACKOFF_BASE_MS << (attempt - 1);
                self.logger.debug(format!(
                    "batch {} {}, attempt {attempt} in {backoff_ms}ms",
                    batch.batch_id,
                    BatchState::Retrying
                ));
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
            if let Some(backend_name) = self.try_backends(&batch).await {
                {
                    let mut stats = self.stats_lock();
                    stats.batches_sent += 1;
                    stats.last_flush_at = Some(Utc::now());
                }
                self.logger.debug(format!(
                    "batch {} {} via backend '{backend_name}'",
                    batch.batch_id,
                    BatchState::Delivered
                ));
                return;
            }
        }

        {
            let mut stats = self.stats_lock();
            stats.batches_dropped += 1;
        }
        self.logger.log(
            LogLevel::Error,
            format!(
                "batch {} {} after {} attempts, {} records lost",
                batch.batch_id,
                BatchState::Dropped,
                RETRY_CAP + 1,
                batch.records.len()
            ),
            None,
            None,
        );
    }

    // Fallback chain: attempt backends in configured order with the same
    // batch; the first success wins.
    async fn try_backends(&self, batch: &ErrorReportBatch) -> Option<String> {
        let chain: Vec<Arc<dyn Backend>> = {
            let backends = match self.backends.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            backends.clone()
        };
        if chain.is_empty() {
            self.logger
                .warn(format!("no enabled backends for batch {}", batch.batch_id));
            return None;
        }

        self.dispatching.store(true, Ordering::SeqCst);
        let mut delivered_via = None;
        for backend in chain {
            match backend.send(batch).await {
                Ok(()) => {
                    delivered_via = Some(backend.name().to_string());
                    break;
                }
                Err(reason) => {
                    self.logger.warn(format!(
                        "backend '{}' failed for batch {}: {reason}",
                        backend.name(),
                        batch.batch_id
                    ));
                }
            }
        }
        self.dispatching.store(false, Ordering::SeqCst);
        delivered_via
    }

    fn inner_lock(&self) -> MutexGuard<'_, QueueInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn stats_lock(&self) -> MutexGuard<'_, QueueStatistics> {
        match self.stats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn sample_in(rate: f64) -> bool {
    if rate >= 1.0 {
        return true;
    }
    if rate <= 0.0 {
        return false;
    }
    rand::rng().random_bool(rate)
}
