//! Bounded drop-oldest buffer between a source and the cycle scheduler
//!
//! Pushing never blocks the source. When the buffer is full the oldest
//! report is evicted, trading staleness for bounded memory.

use super::RawReport;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct ReportQueue {
    inner: Arc<Mutex<VecDeque<RawReport>>>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl ReportQueue {
    /// `capacity` is clamped to at least 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<RawReport>> {
        // A panic while holding the lock cannot leave the deque half-updated
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a report; returns true if the oldest report was evicted to make room
    pub fn push(&self, report: RawReport) -> bool {
        let mut queue = self.lock();
        let evicted = if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        };
        queue.push_back(report);
        evicted
    }

    /// Take everything buffered so far, oldest first
    pub fn drain(&self) -> Vec<RawReport> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Evictions since the previous call
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}
