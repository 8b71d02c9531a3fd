//! Batch transports
//!
//! A transport takes one ordered batch of pending events, performs a single
//! network exchange and reports what the collector did with it.

pub mod http;
pub mod stdout;

use crate::error::TransportError;
use crate::event::PendingEvent;
use async_trait::async_trait;

pub use http::HttpTransport;
pub use stdout::StdoutTransport;

/// Transport trait - sends one batch per call
///
/// `Err` means the exchange itself failed (connection refused, timeout) and
/// the collector gave no verdict; the retry executor treats it as retryable.
/// `Ok` carries the collector's verdict.
///
/// # Example
///
/// ```ignore
/// struct QueueTransport {
///     producer: MyQueueProducer,
/// }
///
/// #[async_trait]
/// impl BatchTransport for QueueTransport {
///     fn name(&self) -> &'static str { "queue" }
///
///     async fn send(&self, events: &[PendingEvent]) -> Result<DeliveryOutcome, TransportError> {
///         self.producer.publish(events).await?;
///         Ok(DeliveryOutcome::Success)
///     }
/// }
/// ```
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Transport name for identification and logging
    fn name(&self) -> &'static str;

    /// Send one batch of events
    async fn send(&self, events: &[PendingEvent]) -> Result<DeliveryOutcome, TransportError>;

    /// Graceful shutdown
    ///
    /// Called once after the final flush cycle completes.
    async fn shutdown(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Verdict for one event of a batch the collector rejected in part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFailure {
    /// Position of the event within the batch
    pub index: usize,
    /// Error messages reported by the collector
    pub errors: Vec<String>,
}

/// Result of one send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Every event was accepted
    Success,

    /// Some events were rejected; each event already has a final verdict
    PartialFailure {
        failed: Vec<EventFailure>,
        total: usize,
    },

    /// The whole batch was rejected
    ///
    /// `retryable` is set for server-side conditions (5xx, 429) where the
    /// collector made no per-event decision.
    TotalFailure {
        status: u16,
        message: String,
        retryable: bool,
    },

    /// Attempts ran out on a transport-level error
    TransportError { cause: TransportError },
}

impl DeliveryOutcome {
    /// Whether resending the same batch is allowed
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryOutcome::TotalFailure { retryable, .. } => *retryable,
            DeliveryOutcome::TransportError { .. } => true,
            DeliveryOutcome::Success | DeliveryOutcome::PartialFailure { .. } => false,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }

    /// Short label used for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Success => "success",
            DeliveryOutcome::PartialFailure { .. } => "partial_failure",
            DeliveryOutcome::TotalFailure { .. } => "total_failure",
            DeliveryOutcome::TransportError { .. } => "transport_error",
        }
    }
}
