//! Stdout transport for dry runs
//!
//! Prints each event as a JSON line instead of sending it anywhere.
//! Always reports success.

use crate::error::TransportError;
use crate::event::PendingEvent;
use crate::transport::{BatchTransport, DeliveryOutcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stdout transport - prints events for debugging
pub struct StdoutTransport {
    /// Pretty print events as JSON
    pretty: bool,
    /// Count of events printed
    emitted_count: AtomicU64,
}

impl StdoutTransport {
    pub fn new() -> Self {
        Self {
            pretty: false,
            emitted_count: AtomicU64::new(0),
        }
    }

    pub fn pretty() -> Self {
        Self {
            pretty: true,
            emitted_count: AtomicU64::new(0),
        }
    }

    /// Get total events printed
    pub fn emitted_count(&self) -> u64 {
        self.emitted_count.load(Ordering::Relaxed)
    }
}

impl Default for StdoutTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchTransport for StdoutTransport {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn send(&self, events: &[PendingEvent]) -> Result<DeliveryOutcome, TransportError> {
        use std::io::Write;

        let mut stdout = std::io::stdout().lock();

        for event in events {
            let line = if self.pretty {
                serde_json::to_string_pretty(event)
            } else {
                serde_json::to_string(event)
            }
            .map_err(|e| TransportError::Send(e.to_string()))?;

            writeln!(stdout, "{line}").map_err(|e| TransportError::Send(e.to_string()))?;
        }

        self.emitted_count
            .fetch_add(events.len() as u64, Ordering::Relaxed);

        Ok(DeliveryOutcome::Success)
    }
}
