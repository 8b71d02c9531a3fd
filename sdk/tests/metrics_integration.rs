//! Buffer gauges as seen through the global Prometheus registry
//!
//! Kept in its own test binary: the registry is process-wide, so other
//! tests would move the gauges underneath these assertions.

use async_trait::async_trait;
use margindash::metrics::Metrics;
use margindash::{
    BatchTransport, Config, DeliveryOutcome, FailureLog, FlushScheduler, PendingEvent,
    TransportError,
};
use serde_json::json;
use std::sync::Arc;

struct AcceptingTransport;

#[async_trait]
impl BatchTransport for AcceptingTransport {
    fn name(&self) -> &'static str {
        "accepting"
    }

    async fn send(&self, _: &[PendingEvent]) -> Result<DeliveryOutcome, TransportError> {
        Ok(DeliveryOutcome::Success)
    }
}

fn event(id: u64) -> PendingEvent {
    PendingEvent::from_value(json!({ "id": id })).unwrap()
}

#[tokio::test]
async fn test_buffer_gauges_track_enqueue_and_flush() {
    let metrics = Metrics::init().unwrap();
    let config = Config::new("k").with_max_queue_size(10).with_batch_size(5);
    let scheduler =
        FlushScheduler::new(&config, Arc::new(AcceptingTransport), FailureLog::shared(10))
            .unwrap();

    assert_eq!(metrics.buffer_capacity.get(), 10.0);

    for i in 0..3 {
        scheduler.enqueue(event(i));
    }
    assert_eq!(metrics.buffer_size.get(), 3.0);

    // Overflow keeps the gauge pinned at capacity
    for i in 3..15 {
        scheduler.enqueue(event(i));
    }
    assert_eq!(metrics.buffer_size.get(), 10.0);

    scheduler.flush().await;
    assert_eq!(metrics.buffer_size.get(), 0.0);

    scheduler.shutdown().await;
}
