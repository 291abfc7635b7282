//! Background sweep that returns abandoned leases to the queue.
//!
//! A delivery task that dies without finishing or requeueing its message
//! leaves the lease dangling. The reclaimer periodically asks the queue for
//! leases older than the timeout and requeues them at the back, which is
//! what makes delivery at-least-once rather than at-most-once. The sweep
//! period is deliberately longer than the dispatch wall limit so a busy but
//! healthy delivery is not reclaimed out from under its writer.

use std::sync::Arc;
use std::time::Duration;

use logrelay_queue::LogQueue;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SWEEP_INTERVAL: Duration = Duration::from_secs(11);
const LEASE_TIMEOUT: Duration = Duration::from_secs(10);
const SWEEP_LIMIT: usize = 1000;

pub struct OrphanReclaimer {
    queue: Arc<dyn LogQueue>,
    lease_timeout: Duration,
    limit: usize,
    cancel: CancellationToken,
}

impl OrphanReclaimer {
    #[must_use]
    pub fn new(queue: Arc<dyn LogQueue>, cancel: CancellationToken) -> Self {
        Self {
            queue,
            lease_timeout: LEASE_TIMEOUT,
            limit: SWEEP_LIMIT,
            cancel,
        }
    }

    /// Sweeps until cancelled.
    pub async fn run(self) {
        let mut ticker = interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("orphan reclaimer stopping");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }
    }

    /// Requeues every expired lease, up to the sweep limit. Returns how many
    /// were reclaimed.
    pub fn sweep(&self) -> usize {
        let orphans = match self.queue.orphans(self.lease_timeout, self.limit) {
            Ok(orphans) => orphans,
            Err(e) => {
                warn!("error scanning for orphan messages: {e}");
                return 0;
            }
        };
        if orphans.is_empty() {
            return 0;
        }

        info!("requeueing {} orphan message(s)", orphans.len());
        let mut reclaimed = 0;
        for message in orphans {
            match self.queue.requeue(message.id, false) {
                Ok(()) => reclaimed += 1,
                Err(e) => warn!("error requeueing orphan message {}: {e}", message.id),
            }
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logrelay_queue::MemoryQueue;

    fn reclaimer_with_timeout(
        queue: &Arc<MemoryQueue>,
        lease_timeout: Duration,
    ) -> OrphanReclaimer {
        OrphanReclaimer {
            queue: Arc::clone(queue) as Arc<dyn LogQueue>,
            lease_timeout,
            limit: SWEEP_LIMIT,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn sweep_requeues_expired_leases() {
        let queue = Arc::new(MemoryQueue::new());
        queue.enqueue(b"default\tabandoned".to_vec()).unwrap();
        let leased = queue.take().unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let reclaimer = reclaimer_with_timeout(&queue, Duration::from_millis(5));
        assert_eq!(reclaimer.sweep(), 1);
        assert_eq!(queue.leased_len(), 0);

        // Reclaimed messages keep their identity and original timestamp.
        let again = queue.take().unwrap().unwrap();
        assert_eq!(again.id, leased.id);
        assert_eq!(again.enqueued_at, leased.enqueued_at);
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_leases_alone() {
        let queue = Arc::new(MemoryQueue::new());
        queue.enqueue(b"default\tbusy".to_vec()).unwrap();
        queue.take().unwrap().unwrap();

        let reclaimer = reclaimer_with_timeout(&queue, Duration::from_secs(60));
        assert_eq!(reclaimer.sweep(), 0);
        assert_eq!(queue.leased_len(), 1);
    }

    #[tokio::test]
    async fn sweep_of_an_idle_queue_is_a_no_op() {
        let queue = Arc::new(MemoryQueue::new());
        let reclaimer = reclaimer_with_timeout(&queue, Duration::from_millis(1));
        assert_eq!(reclaimer.sweep(), 0);
    }
}
