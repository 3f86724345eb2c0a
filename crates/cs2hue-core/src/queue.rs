// ── Per-device command queues ──
//
// One FIFO worker per light: at most one in-flight write per device,
// writes applied in enqueue order. Each job captures the scene epoch at
// enqueue time and is skipped if the epoch moved on before its turn.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::QueueConfig;
use crate::epoch::SceneEpoch;
use crate::error::CoreError;
use crate::gateway::LightGateway;
use crate::model::{DeviceState, Intent, LightId, Tolerance};

// ── Write options / outcome ──────────────────────────────────────────

/// How a single enqueue should be executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Bypass dedup and throttle.
    pub force: bool,
    /// Read back after writing and resend on mismatch.
    pub verify: bool,
    /// Resends allowed during verification.
    pub retries: u32,
}

impl WriteOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn verified(retries: u32) -> Self {
        Self {
            force: true,
            verify: true,
            retries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum WriteOutcome {
    /// Written (and verified, if requested).
    Applied,
    /// Identical to the last write; nothing sent.
    Deduplicated,
    /// The scene epoch advanced before the write ran; nothing sent.
    Stale,
    /// Written, but the read-back never matched.
    Unverified,
    /// The gateway rejected or timed out the write.
    Failed,
}

impl WriteOutcome {
    /// The device received (or already had) the intent.
    pub fn reached_device(self) -> bool {
        matches!(self, Self::Applied | Self::Deduplicated | Self::Unverified)
    }
}

/// Completion handle for one enqueued write.
#[derive(Debug)]
pub struct WriteTicket(oneshot::Receiver<WriteOutcome>);

impl WriteTicket {
    /// Wait for the write to finish. A queue shut down mid-flight reports `Stale`.
    pub async fn outcome(self) -> WriteOutcome {
        self.0.await.unwrap_or(WriteOutcome::Stale)
    }
}

// ── DeviceQueues ─────────────────────────────────────────────────────

struct WriteJob {
    intent: Intent,
    opts: WriteOptions,
    epoch: u64,
    done: oneshot::Sender<WriteOutcome>,
}

/// What the queue remembers about one light.
#[derive(Debug, Clone, Default)]
struct DeviceRecord {
    /// Stable key of the last successful write; cleared per scene.
    dedup_key: Option<String>,
    /// Start of the throttle window; cleared per scene.
    throttle_from: Option<Instant>,
    /// Last intent that reached the device. Survives scene changes.
    last_intent: Option<Intent>,
    last_write_at: Option<Instant>,
    allowed_off_until: Option<Instant>,
}

/// Cheaply cloneable handle to the per-light write workers.
#[derive(Clone)]
pub struct DeviceQueues {
    inner: Arc<QueuesInner>,
}

struct QueuesInner {
    gateway: Arc<dyn LightGateway>,
    epoch: SceneEpoch,
    config: QueueConfig,
    tolerance: Tolerance,
    senders: DashMap<LightId, mpsc::UnboundedSender<WriteJob>>,
    records: DashMap<LightId, DeviceRecord>,
    cancel: CancellationToken,
}

impl DeviceQueues {
    pub fn new(
        gateway: Arc<dyn LightGateway>,
        epoch: SceneEpoch,
        config: QueueConfig,
        tolerance: Tolerance,
    ) -> Self {
        Self {
            inner: Arc::new(QueuesInner {
                gateway,
                epoch,
                config,
                tolerance,
                senders: DashMap::new(),
                records: DashMap::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn epoch(&self) -> &SceneEpoch {
        &self.inner.epoch
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    pub fn gateway(&self) -> &Arc<dyn LightGateway> {
        &self.inner.gateway
    }

    /// Queue `intent` for `id` behind any earlier writes to that light.
    ///
    /// Never blocks; the returned ticket resolves once the write ran (or
    /// was skipped). Must be called from within a Tokio runtime.
    pub fn enqueue(&self, id: &LightId, intent: Intent, opts: WriteOptions) -> WriteTicket {
        let (done, rx) = oneshot::channel();
        let job = WriteJob {
            intent,
            opts,
            epoch: self.inner.epoch.current(),
            done,
        };

        if self.inner.cancel.is_cancelled() {
            let _ = job.done.send(WriteOutcome::Stale);
            return WriteTicket(rx);
        }

        let sender = self
            .inner
            .senders
            .entry(id.clone())
            .or_insert_with(|| self.spawn_worker(id.clone()))
            .clone();

        if let Err(mpsc::error::SendError(job)) = sender.send(job) {
            let _ = job.done.send(WriteOutcome::Stale);
        }
        WriteTicket(rx)
    }

    fn spawn_worker(&self, id: LightId) -> mpsc::UnboundedSender<WriteJob> {
        let (tx, rx) = mpsc::unbounded_channel();
        let queues = self.clone();
        let cancel = self.inner.cancel.child_token();
        tokio::spawn(device_worker(queues, id, rx, cancel));
        tx
    }

    // ── Device reads ─────────────────────────────────────────────────

    /// Read a light's state, bounded by the I/O timeout.
    pub async fn read_state(&self, id: &LightId) -> Result<DeviceState, CoreError> {
        let timeout = self.inner.config.io_timeout;
        match tokio::time::timeout(timeout, self.inner.gateway.get_state(id)).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout {
                timeout_ms: duration_ms(timeout),
            }),
        }
    }

    // ── Record access ────────────────────────────────────────────────

    pub fn last_intent(&self, id: &LightId) -> Option<Intent> {
        self.inner.records.get(id).and_then(|r| r.last_intent.clone())
    }

    pub fn last_write_at(&self, id: &LightId) -> Option<Instant> {
        self.inner.records.get(id).and_then(|r| r.last_write_at)
    }

    /// Let `id` stay off without reconciler interference until `until`.
    pub fn mark_allowed_off(&self, id: &LightId, until: Instant) {
        self.inner
            .records
            .entry(id.clone())
            .or_default()
            .allowed_off_until = Some(until);
    }

    pub fn is_allowed_off(&self, id: &LightId, now: Instant) -> bool {
        self.inner
            .records
            .get(id)
            .and_then(|r| r.allowed_off_until)
            .is_some_and(|until| now < until)
    }

    /// Forget dedup keys and throttle windows so the next scene writes unconditionally.
    pub fn clear_caches(&self) {
        for mut record in self.inner.records.iter_mut() {
            record.dedup_key = None;
            record.throttle_from = None;
        }
    }

    /// Stop every worker. Pending jobs resolve as `Stale`.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.senders.clear();
    }

    // ── Job execution ────────────────────────────────────────────────

    async fn write(&self, id: &LightId, intent: &Intent) -> Result<(), CoreError> {
        let timeout = self.inner.config.io_timeout;
        match tokio::time::timeout(timeout, self.inner.gateway.set_state(id, intent)).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout {
                timeout_ms: duration_ms(timeout),
            }),
        }
    }

    fn throttle_spacing(&self) -> Duration {
        self.inner
            .config
            .throttle
            .unwrap_or_else(|| self.inner.gateway.write_spacing())
    }

    async fn execute(&self, id: &LightId, job: &WriteJob) -> WriteOutcome {
        let epoch = &self.inner.epoch;
        if !epoch.is_current(job.epoch) {
            trace!(light = %id, epoch = job.epoch, "dropping stale write");
            return WriteOutcome::Stale;
        }

        let key = job.intent.stable_key();
        if !job.opts.force {
            let (duplicate, throttle_from) = self
                .inner
                .records
                .get(id)
                .map(|r| (r.dedup_key.as_deref() == Some(key.as_str()), r.throttle_from))
                .unwrap_or_default();
            if duplicate {
                trace!(light = %id, "duplicate intent skipped");
                return WriteOutcome::Deduplicated;
            }
            if let Some(from) = throttle_from {
                tokio::time::sleep_until(from + self.throttle_spacing()).await;
                if !epoch.is_current(job.epoch) {
                    return WriteOutcome::Stale;
                }
            }
        }

        if let Err(e) = self.write(id, &job.intent).await {
            warn!(light = %id, error = %e, "light write failed");
            return WriteOutcome::Failed;
        }
        self.record_write(id, &job.intent, key);
        tokio::time::sleep(self.inner.config.post_write_gap).await;

        if job.opts.verify {
            return self.verify(id, job).await;
        }
        WriteOutcome::Applied
    }

    fn record_write(&self, id: &LightId, intent: &Intent, key: String) {
        let now = Instant::now();
        let mut record = self.inner.records.entry(id.clone()).or_default();
        record.dedup_key = Some(key);
        record.throttle_from = Some(now);
        record.last_intent = Some(intent.clone());
        record.last_write_at = Some(now);
    }

    async fn verify(&self, id: &LightId, job: &WriteJob) -> WriteOutcome {
        let tolerance = self.inner.tolerance;
        let mut resends = 0;
        loop {
            match self.read_state(id).await {
                Ok(state) if job.intent.matches(&state, &tolerance) => {
                    return WriteOutcome::Applied;
                }
                Ok(state) => debug!(light = %id, ?state, "read-back mismatch"),
                Err(e) => debug!(light = %id, error = %e, "read-back failed"),
            }

            if resends >= job.opts.retries {
                warn!(light = %id, retries = resends, "light did not confirm intent");
                return WriteOutcome::Unverified;
            }
            resends += 1;

            tokio::time::sleep(self.inner.config.verify_backoff).await;
            if !self.inner.epoch.is_current(job.epoch) {
                return WriteOutcome::Stale;
            }
            match self.write(id, &job.intent).await {
                Ok(()) => {
                    self.record_write(id, &job.intent, job.intent.stable_key());
                    tokio::time::sleep(self.inner.config.post_write_gap).await;
                }
                Err(e) => debug!(light = %id, error = %e, "verify resend failed"),
            }
        }
    }
}

async fn device_worker(
    queues: DeviceQueues,
    id: LightId,
    mut rx: mpsc::UnboundedReceiver<WriteJob>,
    cancel: CancellationToken,
) {
    debug!(light = %id, "device worker started");
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            job = rx.recv() => {
                let Some(job) = job else { break };
                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => WriteOutcome::Stale,
                    outcome = queues.execute(&id, &job) => outcome,
                };
                let _ = job.done.send(outcome);
            }
        }
    }
    debug!(light = %id, "device worker stopped");
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
