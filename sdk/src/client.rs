//! The `MarginDash` client: the entry point for producers
//!
//! Wires a `Config` into a transport, a reporter and a `FlushScheduler`.

use crate::config::Config;
use crate::delivery::{ErrorReporter, LogReporter};
use crate::error::Result;
use crate::event::PendingEvent;
use crate::scheduler::{CycleStats, FlushScheduler, SchedulerState};
use crate::serializer::{serialize_event, EventPayload};
use crate::transport::{BatchTransport, HttpTransport};
use std::sync::Arc;
use tracing::{debug, warn};

/// Buffered usage-event client
///
/// `track` and `enqueue` never block and never fail from the caller's
/// point of view. Call `shutdown` before exiting so buffered events are
/// delivered.
///
/// # Example
///
/// ```no_run
/// use margindash::{Config, EventPayload, MarginDash, Provider, VendorResponse};
/// use serde_json::json;
///
/// # async fn run() -> margindash::Result<()> {
/// let client = MarginDash::new(Config::new("md_live_key"))?;
///
/// let response = json!({"model": "gpt-4o", "usage": {"prompt_tokens": 10, "completion_tokens": 5}});
/// client.track(
///     EventPayload::new("cust_1", 250)
///         .with_vendor_response(VendorResponse::from_provider(Provider::OpenAi, &response)),
/// );
///
/// client.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct MarginDash {
    scheduler: FlushScheduler,
    default_event_type: String,
}

impl MarginDash {
    /// Build a client that ships to the collector over HTTP
    ///
    /// The flush timer starts immediately when called inside a Tokio
    /// runtime; otherwise call `start()` once a runtime is available.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_reporter(config, Arc::new(LogReporter))
    }

    /// Like `new`, with a custom reporter for failed batches
    pub fn with_reporter(config: Config, reporter: Arc<dyn ErrorReporter>) -> Result<Self> {
        let transport = Arc::new(HttpTransport::from_config(&config)?);
        let client = Self::with_transport(config, transport, reporter)?;

        if tokio::runtime::Handle::try_current().is_ok() {
            client.start()?;
        } else {
            debug!("no Tokio runtime yet, flush timer not started");
        }
        Ok(client)
    }

    /// Build a client over any transport; the timer is left stopped
    pub fn with_transport(
        config: Config,
        transport: Arc<dyn BatchTransport>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self> {
        Ok(Self {
            scheduler: FlushScheduler::new(&config, transport, reporter)?,
            default_event_type: config.default_event_type,
        })
    }

    /// Start the background flush timer
    pub fn start(&self) -> Result<()> {
        self.scheduler.start()
    }

    /// Serialize and buffer a usage event
    pub fn track(&self, event: EventPayload) {
        match serialize_event(event, &self.default_event_type) {
            Ok(event) => self.scheduler.enqueue(event),
            Err(e) => warn!(error = %e, "failed to serialize event, discarded"),
        }
    }

    /// Buffer an already-serialized event
    pub fn enqueue(&self, event: PendingEvent) {
        self.scheduler.enqueue(event);
    }

    /// Deliver everything buffered now and wait for the result
    pub async fn flush(&self) -> CycleStats {
        self.scheduler.flush().await
    }

    /// Stop the timer and deliver everything still buffered
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    pub fn queue_len(&self) -> usize {
        self.scheduler.len()
    }

    /// Events lost to buffer overflow
    pub fn dropped_count(&self) -> u64 {
        self.scheduler.dropped_count()
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::delivery::FailureLog;
    use crate::error::ShipperError;
    use crate::transport::StdoutTransport;
    use std::time::Duration;

    #[test]
    fn test_new_requires_api_key() {
        let result = MarginDash::new(Config::default());
        assert!(matches!(result, Err(ShipperError::Init(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config::new("key").with_batch_size(0);
        let result = MarginDash::with_transport(
            config,
            Arc::new(StdoutTransport::new()),
            Arc::new(LogReporter),
        );
        assert!(matches!(result, Err(ShipperError::Config(_))));
    }

    #[test]
    fn test_new_outside_runtime_stays_idle() {
        let client = MarginDash::new(Config::new("key")).unwrap();
        assert_eq!(client.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_new_inside_runtime_starts() {
        let client = MarginDash::new(
            Config::new("key").with_flush_interval(Duration::from_secs(60)),
        )
        .unwrap();
        assert_eq!(client.state(), SchedulerState::Running);

        client.shutdown().await;
        assert_eq!(client.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_track_applies_default_event_type() {
        let config = Config::new("key").with_default_event_type("embedding");
        let transport = Arc::new(StdoutTransport::new());
        let client =
            MarginDash::with_transport(config, transport.clone(), FailureLog::shared(4)).unwrap();

        client.track(EventPayload::new("cust_1", 100));
        client.track(EventPayload::new("cust_2", 200).with_event_type("ai_request"));
        assert_eq!(client.queue_len(), 2);

        let stats = client.flush().await;
        assert_eq!(stats.events, 2);
        assert_eq!(transport.emitted_count(), 2);
        assert_eq!(client.queue_len(), 0);
        assert_eq!(client.dropped_count(), 0);
    }
}
