//! Prometheus metrics for the shipper
//!
//! Metrics are opt-in: call `Metrics::init()` once at startup. Until then
//! the `try_*` helpers are no-ops.

use crate::error::{Result, ShipperError};
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// All shipper metrics
pub struct Metrics {
    /// Events accepted by `enqueue`
    pub events_enqueued: Counter,

    /// Events lost (by reason: overflow, undelivered)
    pub events_dropped: CounterVec,

    /// Events the collector accepted (by transport)
    pub events_delivered: CounterVec,

    /// Batches by final outcome
    pub batches: CounterVec,

    /// Individual send attempts, retries included
    pub send_attempts: Counter,

    /// Current buffer size
    pub buffer_size: Gauge,

    /// Buffer capacity
    pub buffer_capacity: Gauge,

    /// Flush cycle duration (by trigger: timer, manual, shutdown)
    pub flush_latency: HistogramVec,

    /// Reporter invocations that panicked
    pub reporter_panics: Counter,
}

impl Metrics {
    /// Initialize metrics (call once at startup)
    ///
    /// Returns error if metric registration fails.
    pub fn init() -> Result<&'static Metrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            events_enqueued: register_counter!(
                "margindash_events_enqueued_total",
                "Total events accepted into the buffer"
            )
            .map_err(|e| ShipperError::Metrics(format!("events_enqueued: {e}")))?,

            events_dropped: register_counter_vec!(
                "margindash_events_dropped_total",
                "Total events lost",
                &["reason"]
            )
            .map_err(|e| ShipperError::Metrics(format!("events_dropped: {e}")))?,

            events_delivered: register_counter_vec!(
                "margindash_events_delivered_total",
                "Total events accepted by the collector",
                &["transport"]
            )
            .map_err(|e| ShipperError::Metrics(format!("events_delivered: {e}")))?,

            batches: register_counter_vec!(
                "margindash_batches_total",
                "Total batches by final outcome",
                &["outcome"]
            )
            .map_err(|e| ShipperError::Metrics(format!("batches: {e}")))?,

            send_attempts: register_counter!(
                "margindash_send_attempts_total",
                "Total send attempts including retries"
            )
            .map_err(|e| ShipperError::Metrics(format!("send_attempts: {e}")))?,

            buffer_size: register_gauge!(
                "margindash_buffer_size",
                "Current number of events in buffer"
            )
            .map_err(|e| ShipperError::Metrics(format!("buffer_size: {e}")))?,

            buffer_capacity: register_gauge!(
                "margindash_buffer_capacity",
                "Maximum buffer capacity"
            )
            .map_err(|e| ShipperError::Metrics(format!("buffer_capacity: {e}")))?,

            flush_latency: register_histogram_vec!(
                "margindash_flush_duration_seconds",
                "Flush cycle duration",
                &["trigger"],
                vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]
            )
            .map_err(|e| ShipperError::Metrics(format!("flush_latency: {e}")))?,

            reporter_panics: register_counter!(
                "margindash_reporter_panics_total",
                "Error reporter invocations that panicked"
            )
            .map_err(|e| ShipperError::Metrics(format!("reporter_panics: {e}")))?,
        };

        // Set the metrics (only succeeds once)
        let _ = METRICS.set(metrics);

        METRICS
            .get()
            .ok_or_else(|| ShipperError::Metrics("Failed to initialize metrics".to_string()))
    }

    /// Get the global metrics instance
    ///
    /// Returns None if metrics haven't been initialized yet.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }

    pub fn record_enqueued(&self) {
        self.events_enqueued.inc();
    }

    pub fn record_dropped(&self, reason: &str, count: u64) {
        self.events_dropped
            .with_label_values(&[reason])
            .inc_by(count as f64);
    }

    pub fn record_delivered(&self, transport: &str, count: u64) {
        self.events_delivered
            .with_label_values(&[transport])
            .inc_by(count as f64);
    }

    pub fn record_batch(&self, outcome: &str) {
        self.batches.with_label_values(&[outcome]).inc();
    }

    pub fn set_buffer_size(&self, size: usize) {
        self.buffer_size.set(size as f64);
    }

    pub fn set_buffer_capacity(&self, capacity: usize) {
        self.buffer_capacity.set(capacity as f64);
    }

    pub fn record_flush(&self, trigger: &str, seconds: f64) {
        self.flush_latency
            .with_label_values(&[trigger])
            .observe(seconds);
    }
}

/// Gather all metrics and encode as Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        String::new()
    }
}

pub fn try_record_enqueued() {
    if let Some(m) = Metrics::get() {
        m.record_enqueued();
    }
}

pub fn try_record_dropped(reason: &str, count: u64) {
    if let Some(m) = Metrics::get() {
        m.record_dropped(reason, count);
    }
}

pub fn try_record_delivered(transport: &str, count: u64) {
    if let Some(m) = Metrics::get() {
        m.record_delivered(transport, count);
    }
}

pub fn try_record_batch(outcome: &str) {
    if let Some(m) = Metrics::get() {
        m.record_batch(outcome);
    }
}

pub fn try_record_attempt() {
    if let Some(m) = Metrics::get() {
        m.send_attempts.inc();
    }
}

pub fn try_record_reporter_panic() {
    if let Some(m) = Metrics::get() {
        m.reporter_panics.inc();
    }
}

pub fn try_set_buffer_size(size: usize) {
    if let Some(m) = Metrics::get() {
        m.set_buffer_size(size);
    }
}

pub fn try_record_flush(trigger: &str, seconds: f64) {
    if let Some(m) = Metrics::get() {
        m.record_flush(trigger, seconds);
    }
}
