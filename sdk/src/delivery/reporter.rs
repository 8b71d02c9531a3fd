//! Error reporting for batches that could not be delivered
//!
//! A reporter receives one `ErrorReport` per terminally failed batch. It is
//! user code, so a panic inside it is caught and logged; it can never break
//! a flush cycle.
//!
//! `FailureLog` keeps the most recent reports in memory for inspection.
//! It is NOT a dead letter queue: reports are lost on restart.

use crate::event::PendingEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Description of one failed batch
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    /// Human readable summary
    pub message: String,
    /// Underlying error, if any
    pub cause: Option<String>,
    /// The batch that failed, in send order
    pub events: Vec<PendingEvent>,
}

/// Receives reports for failed batches
///
/// Any `Fn(ErrorReport) + Send + Sync` closure is a reporter.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, report: ErrorReport);
}

impl<F> ErrorReporter for F
where
    F: Fn(ErrorReport) + Send + Sync,
{
    fn report(&self, report: ErrorReport) {
        self(report)
    }
}

/// Hand a report to `reporter`, containing any panic it raises
///
/// Returns `false` if the reporter panicked.
pub fn deliver_report(reporter: &dyn ErrorReporter, report: ErrorReport) -> bool {
    match catch_unwind(AssertUnwindSafe(|| reporter.report(report))) {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(reason = %reason, "error reporter panicked");
            false
        }
    }
}

/// Default reporter: logs each report
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, report: ErrorReport) {
        warn!(
            message = %report.message,
            cause = report.cause.as_deref().unwrap_or(""),
            events = report.events.len(),
            "events not delivered"
        );
    }
}

/// A captured report with the time it was received
#[derive(Debug, Clone)]
pub struct FailedBatch {
    pub report: ErrorReport,
    pub failed_at: Instant,
}

/// In-memory, bounded store of recent reports (for inspection, not persistence)
///
/// When full, the oldest report is dropped.
pub struct FailureLog {
    batches: Mutex<VecDeque<FailedBatch>>,
    capacity: usize,
    /// Metrics: total reports ever captured
    total_captured: AtomicU64,
    /// Metrics: reports dropped due to capacity
    total_dropped: AtomicU64,
}

impl FailureLog {
    /// Create a new failure log with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            batches: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            total_captured: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
        }
    }

    /// Convenience for sharing the log with a shipper
    pub fn shared(capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(capacity))
    }

    fn push(&self, report: ErrorReport) {
        let dropped = {
            let mut queue = self.batches.lock();
            let dropped = if queue.len() >= self.capacity {
                queue.pop_front();
                true
            } else {
                false
            };
            queue.push_back(FailedBatch {
                report,
                failed_at: Instant::now(),
            });
            dropped
        };

        self.total_captured.fetch_add(1, Ordering::Relaxed);
        if dropped {
            self.total_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drain up to n reports
    pub fn drain(&self, n: usize) -> Vec<FailedBatch> {
        let mut queue = self.batches.lock();
        let drain_count = n.min(queue.len());
        queue.drain(..drain_count).collect()
    }

    /// Peek at reports without removing them
    pub fn peek(&self, n: usize) -> Vec<FailedBatch> {
        let queue = self.batches.lock();
        queue.iter().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.lock().is_empty()
    }

    /// Total reports ever captured
    pub fn total_captured(&self) -> u64 {
        self.total_captured.load(Ordering::Relaxed)
    }

    /// Total reports dropped due to capacity
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.batches.lock().clear();
    }
}

impl ErrorReporter for FailureLog {
    fn report(&self, report: ErrorReport) {
        self.push(report);
    }
}
