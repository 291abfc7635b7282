//! Lease-based buffering queue contract for the logrelay pipeline.
//!
//! The dispatch engine never talks to a storage engine directly; it drives
//! any store through the [`LogQueue`] trait. The lease protocol is what makes
//! at-least-once delivery work: a message taken by a worker stays owned by
//! that worker until it is finished or requeued, and a lease that is never
//! resolved (crashed worker, crashed process) becomes reclaimable once it
//! exceeds the lease timeout.
//!
//! States per message: `Pending` -> `Leased` -> `Finished` (removed), or back
//! to `Pending` via requeue or orphan reclaim. Exactly one worker may hold a
//! given lease at a time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod memory;

pub use memory::MemoryQueue;

/// Errors surfaced by queue implementations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The message id is not currently leased, so it cannot be finished or
    /// requeued. Usually means another worker (or the orphan sweep) already
    /// resolved it.
    #[error("message {0} is not currently leased")]
    NotLeased(u64),

    /// The backing store failed to persist or read a message.
    #[error("queue storage error: {0}")]
    Storage(String),
}

/// A queued payload together with its lease bookkeeping.
///
/// `enqueued_at` is the unix timestamp of the *first* enqueue and is
/// preserved across requeues; retry budgets are measured against it, never
/// against the most recent retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: u64,
    pub payload: Vec<u8>,
    pub enqueued_at: i64,
}

/// The buffering contract consumed by the ingestion gate, the dispatch
/// engine and the orphan reclaimer.
///
/// Implementations must serialize `take`/`finish`/`requeue` per message id so
/// that no two workers can hold the same lease. All operations are short,
/// non-blocking polls: a `take` that finds nothing returns `None` rather than
/// waiting.
pub trait LogQueue: Send + Sync {
    /// Durably persists `payload` in the pending state and returns its id.
    /// An accepted payload must never be lost short of storage-media failure.
    fn enqueue(&self, payload: Vec<u8>) -> Result<u64, QueueError>;

    /// Atomically selects one pending message and leases it to the caller.
    /// Returns `None` immediately when nothing is pending.
    fn take(&self) -> Result<Option<QueueMessage>, QueueError>;

    /// Permanently removes a leased message.
    fn finish(&self, id: u64) -> Result<(), QueueError>;

    /// Returns a leased message to the pending state, preserving its original
    /// `enqueued_at`. With `immediate` false the store may apply its own
    /// backoff before the message becomes takeable again.
    fn requeue(&self, id: u64, immediate: bool) -> Result<(), QueueError>;

    /// Messages that have been leased for longer than `lease_timeout`,
    /// capped at `limit`. Candidates for reclaim; the caller requeues them.
    fn orphans(
        &self,
        lease_timeout: Duration,
        limit: usize,
    ) -> Result<Vec<QueueMessage>, QueueError>;
}

/// Current unix time in seconds, used for message enqueue timestamps.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}
