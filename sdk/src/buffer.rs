//! Bounded event buffer with drop-oldest overflow

use crate::event::PendingEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe ring buffer for pending events
///
/// When full, the oldest event is evicted to admit the new one. Once
/// closed, the buffer refuses new events but can still be drained.
/// `enqueue` and `drain` each take the lock once and never suspend.
pub struct EventBuffer {
    inner: Mutex<Slots>,
    capacity: usize,
    metrics: BufferMetrics,
}

struct Slots {
    events: VecDeque<PendingEvent>,
    closed: bool,
}

/// What `enqueue` did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Stored without eviction
    Stored,
    /// Stored after evicting the oldest event
    EvictedOldest,
    /// Refused, the buffer is closed
    Closed,
}

/// Counters for buffer monitoring
pub struct BufferMetrics {
    /// Total events enqueued
    pub enqueued: AtomicU64,
    /// Total events evicted due to a full buffer
    pub dropped: AtomicU64,
    /// Total events drained
    pub drained: AtomicU64,
}

impl Default for BufferMetrics {
    fn default() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            drained: AtomicU64::new(0),
        }
    }
}

impl EventBuffer {
    /// Create a new buffer holding at most `capacity` events
    ///
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Slots {
                events: VecDeque::with_capacity(capacity.min(4096)),
                closed: false,
            }),
            capacity,
            metrics: BufferMetrics::default(),
        }
    }

    /// Append an event, evicting the oldest one first if full
    pub fn enqueue(&self, event: PendingEvent) -> Enqueued {
        let result = {
            let mut slots = self.inner.lock();
            if slots.closed {
                return Enqueued::Closed;
            }
            let result = if slots.events.len() >= self.capacity {
                slots.events.pop_front();
                Enqueued::EvictedOldest
            } else {
                Enqueued::Stored
            };
            slots.events.push_back(event);
            result
        };

        self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
        if result == Enqueued::EvictedOldest {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
        }

        result
    }

    /// Refuse all further events; already buffered events stay drainable
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Remove and return up to `max_count` events in FIFO order
    pub fn drain(&self, max_count: usize) -> Vec<PendingEvent> {
        if max_count == 0 {
            return Vec::new();
        }

        let events: Vec<PendingEvent> = {
            let mut slots = self.inner.lock();
            let drain_count = max_count.min(slots.events.len());
            slots.events.drain(..drain_count).collect()
        };

        self.metrics
            .drained
            .fetch_add(events.len() as u64, Ordering::Relaxed);

        events
    }

    /// Current number of events in the buffer
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current fill percentage (0.0 - 1.0)
    pub fn fill_ratio(&self) -> f64 {
        let len = self.inner.lock().events.len();
        len as f64 / self.capacity as f64
    }

    pub fn total_enqueued(&self) -> u64 {
        self.metrics.enqueued.load(Ordering::Relaxed)
    }

    /// Events lost to overflow since creation
    pub fn dropped_count(&self) -> u64 {
        self.metrics.dropped.load(Ordering::Relaxed)
    }

    pub fn total_drained(&self) -> u64 {
        self.metrics.drained.load(Ordering::Relaxed)
    }
}
