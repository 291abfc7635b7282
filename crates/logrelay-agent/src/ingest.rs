//! The single entry point every producer-facing listener calls.
//!
//! `submit` validates and normalizes a record, encodes it and enqueues it.
//! While the call is in flight it holds the process-wide in-flight counter,
//! the advisory signal the dispatch engine reads to shrink its batch size
//! under ingestion pressure. The counter is released on every exit path via
//! a drop guard; it is never a correctness invariant.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use logrelay_queue::LogQueue;

use crate::error::IngestError;
use crate::record::{LogRecord, SEPARATOR};

/// Cloneable handle to the ingestion gate. Clones share the queue and the
/// in-flight counter.
#[derive(Clone)]
pub struct Ingestor {
    queue: Arc<dyn LogQueue>,
    in_flight: Arc<AtomicI64>,
}

impl Ingestor {
    #[must_use]
    pub fn new(queue: Arc<dyn LogQueue>) -> Self {
        Self {
            queue,
            in_flight: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Accepts one `(category, message)` pair from a producer.
    ///
    /// Both parts are trimmed and must be non-empty; the category is
    /// lower-cased and must not contain the record separator. Queue errors
    /// are returned verbatim so the listener can answer with a transport
    /// failure.
    pub fn submit(&self, category: &str, message: &str) -> Result<u64, IngestError> {
        let _guard = InFlightGuard::new(&self.in_flight);

        let category = category.trim();
        let message = message.trim();
        if category.is_empty() {
            return Err(IngestError::EmptyCategory);
        }
        if message.is_empty() {
            return Err(IngestError::EmptyMessage);
        }
        if category.contains(SEPARATOR) {
            return Err(IngestError::InvalidCategory);
        }

        let record = LogRecord::new(category.to_lowercase(), message);
        Ok(self.queue.enqueue(record.encode())?)
    }

    /// Shared in-flight counter, read by the dispatch engine's throttle.
    #[must_use]
    pub fn in_flight_counter(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.in_flight)
    }

    #[must_use]
    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::Relaxed)
    }
}

/// Increments the counter on construction, decrements on drop, so the
/// release runs on every exit path including early validation returns.
struct InFlightGuard<'a> {
    counter: &'a AtomicI64,
}

impl<'a> InFlightGuard<'a> {
    fn new(counter: &'a AtomicI64) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logrelay_queue::MemoryQueue;

    fn ingestor() -> (Arc<MemoryQueue>, Ingestor) {
        let queue = Arc::new(MemoryQueue::new());
        let ingestor = Ingestor::new(Arc::clone(&queue) as Arc<dyn LogQueue>);
        (queue, ingestor)
    }

    #[test]
    fn submit_normalizes_and_enqueues() {
        let (queue, ingestor) = ingestor();
        ingestor.submit("  APP  ", "  hello world  ").unwrap();

        let message = queue.take().unwrap().unwrap();
        let record = LogRecord::decode(&message.payload).unwrap();
        assert_eq!(record.category, "app");
        assert_eq!(record.message, "hello world");
    }

    #[test]
    fn submit_rejects_empty_parts() {
        let (_queue, ingestor) = ingestor();
        assert!(matches!(
            ingestor.submit("   ", "hello"),
            Err(IngestError::EmptyCategory)
        ));
        assert!(matches!(
            ingestor.submit("app", "  "),
            Err(IngestError::EmptyMessage)
        ));
    }

    #[test]
    fn submit_rejects_category_containing_separator() {
        let (_queue, ingestor) = ingestor();
        assert!(matches!(
            ingestor.submit("a\tb", "hello"),
            Err(IngestError::InvalidCategory)
        ));
    }

    #[test]
    fn in_flight_counter_settles_back_to_zero() {
        let (_queue, ingestor) = ingestor();
        ingestor.submit("app", "hello").unwrap();
        let _ = ingestor.submit("", "rejected");
        assert_eq!(ingestor.in_flight(), 0);
    }

    #[test]
    fn duplicate_submissions_enqueue_duplicates() {
        let (queue, ingestor) = ingestor();
        ingestor.submit("app", "same").unwrap();
        ingestor.submit("app", "same").unwrap();
        assert_eq!(queue.pending_len(), 2);
    }
}
