//! Batch delivery: send with retry, classify, report
//!
//! ```text
//! batch ──► RetryExecutor(BatchTransport) ──► DeliveryOutcome
//!                                                 │
//!                         Success ◄───────────────┤
//!                                                 └──► ErrorReport ──► ErrorReporter
//! ```
//!
//! Partial and client-side total failures are reported straight away.
//! Retryable failures are only reported once attempts are exhausted.

mod reporter;
mod retry;

pub use reporter::{
    deliver_report, ErrorReport, ErrorReporter, FailedBatch, FailureLog, LogReporter,
};
pub use retry::{BackoffConfig, RetryExecutor, RetryOutcome};

use crate::event::PendingEvent;
use crate::metrics;
use crate::transport::{BatchTransport, DeliveryOutcome};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What happened to one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDisposition {
    pub outcome: DeliveryOutcome,
    pub attempts: u32,
    pub events: usize,
    /// Whether an `ErrorReport` was handed to the reporter
    pub reported: bool,
}

/// Sends batches through a transport with retry and reports failures
pub struct Dispatcher {
    transport: Arc<dyn BatchTransport>,
    executor: RetryExecutor,
    reporter: Arc<dyn ErrorReporter>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn BatchTransport>,
        executor: RetryExecutor,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            transport,
            executor,
            reporter,
        }
    }

    pub fn transport(&self) -> &Arc<dyn BatchTransport> {
        &self.transport
    }

    /// Deliver one batch to completion (success or terminal failure)
    pub async fn send_batch(&self, batch: Vec<PendingEvent>) -> BatchDisposition {
        let events = batch.as_slice();
        let RetryOutcome { outcome, attempts } = self
            .executor
            .execute(|| self.transport.send(events))
            .await;

        let count = batch.len();
        metrics::try_record_batch(outcome.label());
        record_delivery(self.transport.name(), &outcome, count);

        let reported = match build_report(&outcome, attempts, batch) {
            None => {
                debug!(
                    transport = self.transport.name(),
                    count = count,
                    attempts = attempts,
                    "batch delivered"
                );
                false
            }
            Some(report) => {
                warn!(
                    transport = self.transport.name(),
                    outcome = outcome.label(),
                    attempts = attempts,
                    message = %report.message,
                    "batch not delivered"
                );
                if !deliver_report(self.reporter.as_ref(), report) {
                    metrics::try_record_reporter_panic();
                }
                true
            }
        };

        BatchDisposition {
            outcome,
            attempts,
            events: count,
            reported,
        }
    }
}

fn record_delivery(transport: &str, outcome: &DeliveryOutcome, count: usize) {
    match outcome {
        DeliveryOutcome::Success => metrics::try_record_delivered(transport, count as u64),
        DeliveryOutcome::PartialFailure { failed, .. } => {
            let failed = failed.len().min(count);
            metrics::try_record_delivered(transport, (count - failed) as u64);
            metrics::try_record_dropped("rejected", failed as u64);
        }
        DeliveryOutcome::TotalFailure {
            retryable: false, ..
        } => metrics::try_record_dropped("rejected", count as u64),
        DeliveryOutcome::TotalFailure { .. } | DeliveryOutcome::TransportError { .. } => {
            metrics::try_record_dropped("undelivered", count as u64)
        }
    }
}

/// Build the report for a final outcome, or `None` on success
pub fn build_report(
    outcome: &DeliveryOutcome,
    attempts: u32,
    events: Vec<PendingEvent>,
) -> Option<ErrorReport> {
    let count = events.len();
    let (message, cause) = match outcome {
        DeliveryOutcome::Success => return None,

        DeliveryOutcome::PartialFailure { failed, total } => {
            let details: Vec<String> = failed
                .iter()
                .map(|f| format!("event {}: {}", f.index, f.errors.join(", ")))
                .collect();
            (
                format!("{} of {} events failed", failed.len(), total),
                (!details.is_empty()).then(|| details.join("; ")),
            )
        }

        DeliveryOutcome::TotalFailure {
            status,
            message,
            retryable: false,
        } => (
            format!("batch of {count} events rejected with status {status}"),
            Some(message.clone()),
        ),

        DeliveryOutcome::TotalFailure {
            status, message, ..
        } => {
            error!(status = status, attempts = attempts, "retries exhausted");
            (
                format!(
                    "batch of {count} events not delivered after {attempts} attempts (status {status})"
                ),
                Some(message.clone()),
            )
        }

        DeliveryOutcome::TransportError { cause } => {
            error!(error = %cause, attempts = attempts, "retries exhausted");
            (
                format!("batch of {count} events not delivered after {attempts} attempts"),
                Some(cause.to_string()),
            )
        }
    };

    Some(ErrorReport {
        message,
        cause,
        events,
    })
}
