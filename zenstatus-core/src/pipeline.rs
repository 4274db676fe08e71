use crate::error::{PipelineError, Result};
use crate::events::{AuditEvent, ProgressEvent};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zenstatus_scanner::{AuditRecord, AuditTarget, PageAuditor, StatusMessage};

/// Options for batching and pooling an audit run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pages per batch. Batches run one after another.
    pub batch_size: usize,
    pub min_pool: usize,
    pub max_pool: usize,
    /// Idle time after which a heartbeat is emitted.
    pub heartbeat_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 300,
            min_pool: 2,
            max_pool: 8,
            heartbeat_interval: Duration::from_secs(10),
        }
    }
}

impl PipelineConfig {
    /// Concurrent audits for a batch of `batch_len` pages. Never below one,
    /// and `max_pool` wins over `min_pool` when the bounds are inverted.
    pub fn pool_size(&self, batch_len: usize) -> usize {
        batch_len.max(self.min_pool).min(self.max_pool).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidOption(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.min_pool == 0 || self.min_pool > self.max_pool {
            return Err(PipelineError::InvalidOption(format!(
                "pool bounds {}..{} are not usable",
                self.min_pool, self.max_pool
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(PipelineError::InvalidOption(
                "heartbeat interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Results of one run, in final order.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub results: Vec<AuditRecord>,
    /// True when the run stopped before every page was audited.
    pub cancelled: bool,
}

/// Successful pages first, then by numeric status; pages without a status
/// go last. Stable, so ties keep collection order.
pub fn sort_results(results: &mut [AuditRecord]) {
    results.sort_by_key(|r| {
        (
            r.status_message != StatusMessage::Ok,
            r.status_code.map(u32::from).unwrap_or(u32::MAX),
        )
    });
}

/// Runs a [`PageAuditor`] over a list of targets in sequential batches,
/// each batch fanned out across a bounded pool.
pub struct AuditPipeline {
    auditor: Arc<PageAuditor>,
    config: PipelineConfig,
}

impl AuditPipeline {
    pub fn new(auditor: Arc<PageAuditor>) -> Self {
        Self {
            auditor,
            config: PipelineConfig::default(),
        }
    }

    /// Fails with [`PipelineError::InvalidOption`] when `config` does not validate.
    pub fn with_config(auditor: Arc<PageAuditor>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { auditor, config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Audit every target, streaming progress and heartbeats to `events`.
    ///
    /// Cancelling `cancel`, or dropping the receiving end of `events`, stops
    /// the run: later batches are not started and queued pages in the
    /// current batch are skipped, while audits already in flight finish and
    /// are kept.
    pub async fn run(
        &self,
        targets: Vec<AuditTarget>,
        events: &mpsc::Sender<AuditEvent>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let total = targets.len();
        let stop = cancel.child_token();
        let batch_size = self.config.batch_size.max(1);

        info!("Auditing {} pages in batches of {}", total, batch_size);
        emit(events, &stop, AuditEvent::Heartbeat).await;

        let mut results = Vec::with_capacity(total);
        for (batch_no, batch) in targets.chunks(batch_size).enumerate() {
            if stop.is_cancelled() {
                info!("Run cancelled, skipping remaining batches");
                break;
            }
            self.run_batch(batch_no, batch, total, &mut results, events, &stop)
                .await;
        }

        sort_results(&mut results);
        let cancelled = results.len() < total;
        if cancelled {
            info!("Run stopped after {} of {} pages", results.len(), total);
        }
        RunOutcome { results, cancelled }
    }

    async fn run_batch(
        &self,
        batch_no: usize,
        batch: &[AuditTarget],
        total: usize,
        results: &mut Vec<AuditRecord>,
        events: &mpsc::Sender<AuditEvent>,
        stop: &CancellationToken,
    ) {
        let pool = self.config.pool_size(batch.len());
        debug!(
            "Starting batch {} with {} pages on {} workers",
            batch_no + 1,
            batch.len(),
            pool
        );

        let semaphore = Arc::new(Semaphore::new(pool));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(usize, AuditRecord)>();
        let mut handles = Vec::with_capacity(batch.len());

        for (idx, target) in batch.iter().enumerate() {
            let auditor = self.auditor.clone();
            let semaphore = semaphore.clone();
            let stop = stop.clone();
            let done_tx = done_tx.clone();
            let url = target.url.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if stop.is_cancelled() {
                    return;
                }
                let record = match AssertUnwindSafe(auditor.audit(&url)).catch_unwind().await {
                    Ok(record) => record,
                    Err(_) => {
                        warn!("Audit of {} panicked", url);
                        AuditRecord::failed(&url, StatusMessage::Error)
                    }
                };
                let _ = done_tx.send((idx, record));
            }));
        }
        drop(done_tx);

        loop {
            match tokio::time::timeout(self.config.heartbeat_interval, done_rx.recv()).await {
                Ok(Some((idx, mut record))) => {
                    if let Some(first) = &batch[idx].duplicate_of {
                        record.annotate_duplicate(first);
                    }
                    results.push(record);
                    let progress = ProgressEvent {
                        completed: results.len(),
                        total,
                    };
                    emit(events, stop, AuditEvent::Progress(progress)).await;
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(
                        "No audit finished in {:?}, sending heartbeat",
                        self.config.heartbeat_interval
                    );
                    emit(events, stop, AuditEvent::Heartbeat).await;
                }
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Audit task failed: {}", e);
            }
        }
        debug!("Finished batch {}", batch_no + 1);
    }
}

/// Send `event`; a closed receiver cancels the rest of the run. Once the run
/// is cancelled a full channel drops the event instead of waiting.
async fn emit(events: &mpsc::Sender<AuditEvent>, stop: &CancellationToken, event: AuditEvent) {
    tokio::select! {
        biased;
        sent = events.send(event) => {
            if sent.is_err() && !stop.is_cancelled() {
                info!("Event receiver dropped, cancelling run");
                stop.cancel();
            }
        }
        _ = stop.cancelled() => debug!("Run cancelled, dropping event for a full channel"),
    }
}
