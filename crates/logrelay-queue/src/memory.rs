//! In-process implementation of the [`LogQueue`] lease protocol.
//!
//! `MemoryQueue` keeps pending messages in a deque and leased messages in a
//! map keyed by id, all under a single mutex, so the per-id serialization the
//! contract requires comes for free. It is the store used by tests and by
//! deployments that accept process-local buffering; crash durability is the
//! concern of whichever external store replaces it behind the same trait.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::{unix_now, LogQueue, QueueError, QueueMessage};

#[derive(Debug)]
struct Leased {
    message: QueueMessage,
    leased_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    pending: VecDeque<QueueMessage>,
    leased: HashMap<u64, Leased>,
}

/// Lease-capable FIFO queue held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently pending (not leased).
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of messages currently leased to workers.
    #[must_use]
    pub fn leased_len(&self) -> usize {
        self.lock().leased.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic while holding it; the queue state is
        // still structurally valid, so keep serving rather than wedging the
        // whole pipeline.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl LogQueue for MemoryQueue {
    fn enqueue(&self, payload: Vec<u8>) -> Result<u64, QueueError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.pending.push_back(QueueMessage {
            id,
            payload,
            enqueued_at: unix_now(),
        });
        Ok(id)
    }

    fn take(&self) -> Result<Option<QueueMessage>, QueueError> {
        let mut inner = self.lock();
        let Some(message) = inner.pending.pop_front() else {
            return Ok(None);
        };
        let id = message.id;
        inner.leased.insert(
            id,
            Leased {
                message: message.clone(),
                leased_at: Instant::now(),
            },
        );
        Ok(Some(message))
    }

    fn finish(&self, id: u64) -> Result<(), QueueError> {
        let mut inner = self.lock();
        match inner.leased.remove(&id) {
            Some(_) => Ok(()),
            None => Err(QueueError::NotLeased(id)),
        }
    }

    fn requeue(&self, id: u64, immediate: bool) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let Some(leased) = inner.leased.remove(&id) else {
            return Err(QueueError::NotLeased(id));
        };
        // Non-immediate requeues go to the back of the line, which is this
        // store's backoff: everything already pending drains first.
        if immediate {
            inner.pending.push_front(leased.message);
        } else {
            inner.pending.push_back(leased.message);
        }
        Ok(())
    }

    fn orphans(
        &self,
        lease_timeout: Duration,
        limit: usize,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let inner = self.lock();
        Ok(inner
            .leased
            .values()
            .filter(|leased| leased.leased_at.elapsed() >= lease_timeout)
            .take(limit)
            .map(|leased| leased.message.clone())
            .collect())
    }
}
