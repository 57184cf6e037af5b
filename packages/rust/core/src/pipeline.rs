//! Lead pipeline: accept → score → fan out to every sink → settle or retry.
//!
//! `submit` only validates and enqueues; delivery happens on a drain task.
//! A single in-flight flag keeps drains from running concurrently, so each
//! queued record is delivered by exactly one drain. Sink failures are folded
//! into a [`DeliveryReport`]; one success is enough to mark a lead processed.
//! Leads that exhaust their retries are marked failed. Either way the terminal
//! record goes to the bounded [`BackupLog`].

use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

use leadpipe_shared::{
    Ack, LeadAssessment, LeadId, LeadPipeError, LeadRecord, LeadStatus, PipelineConfig,
    RawLead, Result, ScoringConfig,
};
use leadpipe_sinks::LeadSink;
use leadpipe_storage::{BackupLog, KeyValueStore};

use crate::scoring::LeadScorer;

/// Ceiling on the delay before a retried lead re-enters the queue.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Result of one sink attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOutcome {
    pub sink: String,
    /// `None` when the sink accepted the lead.
    pub error: Option<String>,
}

impl SinkOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-sink outcomes of one delivery attempt.
#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    pub outcomes: Vec<SinkOutcome>,
}

impl DeliveryReport {
    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(SinkOutcome::succeeded)
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    /// `sink: error` pairs for the failed sinks, `; `-separated.
    pub fn failure_summary(&self) -> String {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| format!("{}: {e}", o.sink)))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Counts from one drain of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub processed: usize,
    pub failed: usize,
    pub requeued: usize,
}

// ---------------------------------------------------------------------------
// LeadPipeline
// ---------------------------------------------------------------------------

/// Scores leads and delivers them to every configured sink with bounded retry.
///
/// Cloning is cheap and clones share the same queue.
#[derive(Clone)]
pub struct LeadPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    config: PipelineConfig,
    scorer: LeadScorer,
    sinks: Vec<Arc<dyn LeadSink>>,
    backup: BackupLog,
    queue: Mutex<VecDeque<LeadRecord>>,
    /// Leads accepted but not yet terminal: queued, in flight, or waiting out a backoff.
    pending: Mutex<HashSet<LeadId>>,
    processing: AtomicBool,
    /// Signalled whenever a lead settles.
    settled: Notify,
}

impl LeadPipeline {
    /// Build a pipeline. Fails when no sink is configured or the config is out of bounds.
    pub fn new(
        config: PipelineConfig,
        scoring: ScoringConfig,
        sinks: Vec<Arc<dyn LeadSink>>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        config.validate()?;
        if sinks.is_empty() {
            return Err(LeadPipeError::config(
                "at least one delivery sink must be configured",
            ));
        }

        let backup = BackupLog::new(store, config.backup_capacity);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                scorer: LeadScorer::new(scoring),
                sinks,
                backup,
                queue: Mutex::new(VecDeque::new()),
                pending: Mutex::new(HashSet::new()),
                processing: AtomicBool::new(false),
                settled: Notify::new(),
            }),
        })
    }

    /// Accept a lead for processing.
    ///
    /// Returns as soon as the lead is queued. The [`Ack`] means accepted, not
    /// delivered; the final outcome is visible through [`Self::status`] and the
    /// backup log. Must be called within a tokio runtime for delivery to start.
    #[instrument(skip_all, fields(source = %raw.source))]
    pub fn submit(&self, raw: RawLead) -> Result<Ack> {
        raw.validate()?;
        let record = LeadRecord::from_raw(raw);
        let ack = Ack {
            lead_id: record.id.clone(),
            status: record.status,
            accepted_at: record.timestamp,
        };

        {
            let mut queue = self.inner.lock_queue();
            let capacity = self.inner.config.queue_capacity;
            if queue.len() >= capacity {
                warn!(capacity, "lead queue full, rejecting submission");
                return Err(LeadPipeError::QueueFull { capacity });
            }
            self.inner.lock_pending().insert(record.id.clone());
            queue.push_back(record);
        }

        info!(lead_id = %ack.lead_id, "lead accepted");
        Inner::spawn_drain(&self.inner);
        Ok(ack)
    }

    /// Drain the queue on the current task. No-op if a drain is already running.
    pub async fn process_queue(&self) -> DrainReport {
        self.inner.process_queue().await
    }

    /// Wait until every accepted lead has reached a terminal state.
    pub async fn flush(&self) {
        if !self.inner.queue_is_empty() {
            Inner::spawn_drain(&self.inner);
        }

        loop {
            let settled = self.inner.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            if self.inner.lock_pending().is_empty() {
                return;
            }
            settled.await;
        }
    }

    /// `pending` until terminal, then the status recorded in the backup log.
    /// `None` for unknown ids and leads already evicted from the log.
    pub async fn status(&self, id: &LeadId) -> Result<Option<LeadStatus>> {
        if self.inner.lock_pending().contains(id) {
            return Ok(Some(LeadStatus::Pending));
        }
        Ok(self.inner.backup.find(id).await?.map(|record| record.status))
    }

    /// Leads waiting in the queue (excludes in-flight and backing-off leads).
    pub fn queue_len(&self) -> usize {
        self.inner.lock_queue().len()
    }

    /// Leads accepted but not yet terminal.
    pub fn pending_len(&self) -> usize {
        self.inner.lock_pending().len()
    }

    pub fn backup_log(&self) -> &BackupLog {
        &self.inner.backup
    }
}

impl Inner {
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<LeadRecord>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashSet<LeadId>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pop_front(&self) -> Option<LeadRecord> {
        self.lock_queue().pop_front()
    }

    fn queue_is_empty(&self) -> bool {
        self.lock_queue().is_empty()
    }

    /// Start a drain task if a runtime is available.
    fn spawn_drain(inner: &Arc<Self>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(inner);
                handle.spawn(async move {
                    inner.process_queue().await;
                });
            }
            Err(_) => warn!("no async runtime, lead stays queued until the next drain"),
        }
    }

    #[instrument(skip_all)]
    async fn process_queue(self: &Arc<Self>) -> DrainReport {
        let Some(mut guard) = DrainGuard::acquire(&self.processing) else {
            debug!("drain already in progress");
            return DrainReport::default();
        };

        let mut report = DrainReport::default();
        loop {
            while let Some(record) = self.pop_front() {
                self.process_record(record, &mut report).await;
            }
            drop(guard);

            // a submit can land between the last pop and the flag reset
            if self.queue_is_empty() {
                break;
            }
            match DrainGuard::acquire(&self.processing) {
                Some(next) => guard = next,
                None => break,
            }
        }

        debug!(
            processed = report.processed,
            failed = report.failed,
            requeued = report.requeued,
            "drain finished"
        );
        report
    }

    async fn process_record(self: &Arc<Self>, mut record: LeadRecord, report: &mut DrainReport) {
        let assessment = match record.assessment.take() {
            Some(assessment) => assessment,
            None => self.scorer.assess(&record),
        };
        let attempt = record.retry_count + 1;
        debug!(
            lead_id = %record.id,
            attempt,
            score = assessment.score,
            priority = %assessment.priority,
            "delivering lead"
        );

        let delivery = self.deliver(&record, &assessment).await;
        record.assessment = Some(assessment);

        if delivery.any_succeeded() {
            record.status = LeadStatus::Processed;
            record.last_error = None;
            info!(
                lead_id = %record.id,
                attempt,
                delivered = delivery.succeeded_count(),
                sinks = delivery.outcomes.len(),
                "lead processed"
            );
            report.processed += 1;
            self.settle(record).await;
            return;
        }

        record.retry_count += 1;
        let failure = LeadPipeError::AllSinksFailed {
            lead_id: record.id.to_string(),
            attempt: record.retry_count,
        };
        let summary = delivery.failure_summary();

        if record.retry_count < self.config.max_retries {
            warn!(lead_id = %record.id, error = %failure, "requeueing lead");
            record.last_error = Some(format!("{failure}: {summary}"));
            report.requeued += 1;
            self.requeue(record);
        } else {
            let exhausted = LeadPipeError::RetriesExhausted {
                lead_id: record.id.to_string(),
                attempts: record.retry_count,
            };
            warn!(lead_id = %record.id, error = %exhausted, "lead failed");
            record.status = LeadStatus::Failed;
            record.last_error = Some(format!("{exhausted}: {summary}"));
            report.failed += 1;
            self.settle(record).await;
        }
    }

    /// Attempt every sink concurrently and collect one outcome per sink.
    async fn deliver(&self, record: &LeadRecord, assessment: &LeadAssessment) -> DeliveryReport {
        let timeout = self.config.sink_timeout;

        let attempts = self.sinks.iter().map(|sink| async move {
            let attempt = AssertUnwindSafe(sink.deliver(record, assessment)).catch_unwind();
            let result = match tokio::time::timeout(timeout, attempt).await {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => Err(LeadPipeError::delivery(
                    sink.name(),
                    format!("panicked: {}", panic_message(panic.as_ref())),
                )),
                Err(_) => Err(LeadPipeError::delivery(
                    sink.name(),
                    format!("timed out after {}ms", timeout.as_millis()),
                )),
            };

            match result {
                Ok(()) => SinkOutcome {
                    sink: sink.name().to_string(),
                    error: None,
                },
                Err(e) => {
                    warn!(
                        lead_id = %record.id,
                        sink = sink.name(),
                        error = %e,
                        "sink delivery failed"
                    );
                    SinkOutcome {
                        sink: sink.name().to_string(),
                        error: Some(e.to_string()),
                    }
                }
            }
        });

        DeliveryReport {
            outcomes: join_all(attempts).await,
        }
    }

    /// Put a lead back at the tail of the queue, after the backoff delay.
    fn requeue(self: &Arc<Self>, record: LeadRecord) {
        let delay = self.retry_delay(record.retry_count);
        if delay.is_zero() {
            self.lock_queue().push_back(record);
            return;
        }

        debug!(lead_id = %record.id, delay_ms = delay.as_millis() as u64, "scheduling retry");
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.lock_queue().push_back(record);
            Inner::spawn_drain(&inner);
        });
    }

    /// `retry_backoff * 2^(retry_count - 1)`, capped.
    fn retry_delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(16);
        self.config
            .retry_backoff
            .saturating_mul(1 << exponent)
            .min(MAX_RETRY_DELAY)
    }

    /// Record a terminal lead in the backup log and release it.
    async fn settle(&self, record: LeadRecord) {
        if let Err(e) = self.backup.append(&record).await {
            warn!(lead_id = %record.id, error = %e, "failed to write lead to backup log");
        }
        self.lock_pending().remove(&record.id);
        self.settled.notify_waiters();
    }
}

/// Holds the single-drain flag; releases it on drop, unwinding included.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
