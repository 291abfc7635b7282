//! The dispatch engine: drains the queue and drives the writers.
//!
//! Every second the engine runs one cycle. A cycle leases messages one at a
//! time, spawns a delivery task per message, and stops when the queue is
//! empty, no writer slot frees up within the admission timeout, the wall
//! limit is hit, or ingestion pressure shrinks the batch. Delivery tasks own
//! a semaphore permit for their whole lifetime, so `max_write_threads` bounds
//! concurrent writer calls across cycles, not per cycle.
//!
//! Failed deliveries consult the writer's retry budget: the message is
//! requeued at the back while the budget allows, otherwise it is dropped by
//! finishing its lease.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use logrelay_queue::{unix_now, LogQueue, QueueMessage};
use tokio::sync::Semaphore;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::ingest::Ingestor;
use crate::record::LogRecord;
use crate::writers::WriterRegistry;

/// Pause between dispatch cycles.
const CYCLE_INTERVAL: Duration = Duration::from_secs(1);

/// How long a cycle waits for a free writer slot before giving up.
const ADMISSION_TIMEOUT: Duration = Duration::from_secs(1);

/// Hard wall-clock bound on a single cycle.
const CYCLE_WALL_LIMIT: Duration = Duration::from_secs(10);

const DEFAULT_BATCH_CEILING: u64 = 100;

/// Decides whether a failed delivery goes back on the queue.
///
/// `retry_seconds == 0` never retries, negative retries forever, positive
/// retries while `now` is still before `enqueued_at + retry_seconds`. The
/// age is measured from the original enqueue, so a message cannot bounce
/// between requeues indefinitely.
#[must_use]
pub fn should_retry(retry_seconds: i64, enqueued_at: i64, now: i64) -> bool {
    retry_seconds < 0 || (retry_seconds > 0 && now < enqueued_at + retry_seconds)
}

pub struct DispatchEngine {
    queue: Arc<dyn LogQueue>,
    registry: Arc<WriterRegistry>,
    in_flight: Arc<AtomicI64>,
    permits: Arc<Semaphore>,
    capacity: u32,
    success_total: Arc<AtomicU64>,
    /// Largest number of messages a single cycle will lease when ingestion
    /// is idle. Pressure divides this down.
    batch_ceiling: u64,
    cancel: CancellationToken,
}

impl DispatchEngine {
    #[must_use]
    pub fn new(
        queue: Arc<dyn LogQueue>,
        registry: Arc<WriterRegistry>,
        ingestor: &Ingestor,
        max_write_threads: usize,
        cancel: CancellationToken,
    ) -> Self {
        let capacity = u32::try_from(max_write_threads).unwrap_or(u32::MAX);
        Self {
            queue,
            registry,
            in_flight: ingestor.in_flight_counter(),
            permits: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
            success_total: Arc::new(AtomicU64::new(0)),
            batch_ceiling: DEFAULT_BATCH_CEILING,
            cancel,
        }
    }

    /// Total successful deliveries since startup.
    #[must_use]
    pub fn success_total(&self) -> u64 {
        self.success_total.load(Ordering::Relaxed)
    }

    /// Runs cycles until cancelled.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(CYCLE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("dispatch engine stopping");
                    return;
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    /// Waits for every spawned delivery task to finish. Used on shutdown so
    /// leased messages are resolved instead of left for the orphan sweep.
    pub async fn quiesce(&self) {
        let _all = self.permits.acquire_many(self.capacity).await;
    }

    /// Leases and dispatches one batch. Returns the number of messages
    /// handed to delivery tasks; the tasks themselves may still be running
    /// when this returns.
    pub async fn run_cycle(&self) -> u64 {
        let started = Instant::now();
        let mut taken: u64 = 0;

        loop {
            let permit = match timeout(
                ADMISSION_TIMEOUT,
                Arc::clone(&self.permits).acquire_owned(),
            )
            .await
            {
                Ok(Ok(permit)) => permit,
                // Timed out waiting for a slot, or the semaphore is closed.
                Ok(Err(_)) | Err(_) => break,
            };

            let message = match self.queue.take() {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(e) => {
                    warn!("error taking message from queue: {e}");
                    break;
                }
            };
            taken += 1;

            let queue = Arc::clone(&self.queue);
            let registry = Arc::clone(&self.registry);
            let success = Arc::clone(&self.success_total);
            tokio::spawn(async move {
                deliver(queue, registry, success, message).await;
                drop(permit);
            });

            let pressure = self.in_flight.load(Ordering::Relaxed).max(0) as u64;
            if pressure > 0 && taken >= self.batch_ceiling / (pressure + 1) {
                break;
            }
            if started.elapsed() >= CYCLE_WALL_LIMIT {
                break;
            }
        }

        if taken > 0 {
            info!(
                "dispatched {taken} message(s) in {:?}",
                started.elapsed()
            );
        }
        taken
    }
}

async fn deliver(
    queue: Arc<dyn LogQueue>,
    registry: Arc<WriterRegistry>,
    success: Arc<AtomicU64>,
    message: QueueMessage,
) {
    let finish = |queue: &Arc<dyn LogQueue>| {
        if let Err(e) = queue.finish(message.id) {
            warn!("error finishing message {}: {e}", message.id);
        }
    };

    let Some(record) = LogRecord::decode(&message.payload) else {
        warn!("discarding undecodable message {}", message.id);
        finish(&queue);
        return;
    };
    let Some(entry) = registry.resolve(&record.category) else {
        warn!("no log writer found for category [{}]", record.category);
        finish(&queue);
        return;
    };

    match entry.writer.write(&record.category, &record.message).await {
        Ok(()) => {
            success.fetch_add(1, Ordering::Relaxed);
            finish(&queue);
        }
        Err(e) => {
            error!(
                "error writing message {} to category [{}]: {e}",
                message.id, record.category
            );
            if should_retry(entry.retry_seconds, message.enqueued_at, unix_now()) {
                if let Err(e) = queue.requeue(message.id, false) {
                    warn!("error requeueing message {}: {e}", message.id);
                }
            } else {
                warn!(
                    "dropping message {} for category [{}]: retry budget exhausted",
                    message.id, record.category
                );
                finish(&queue);
            }
        }
    }
}
