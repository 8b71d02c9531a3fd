//! Flush scheduling: the background timer, on-demand flush and shutdown drain
//!
//! Every flush, whichever path triggers it, runs as a *cycle* under one
//! async mutex, so at most one cycle is ever in flight. A cycle drains the
//! events present when it starts, chunks them into batches of
//! `batch_size`, and delivers all batches concurrently.
//!
//! ```text
//! Idle ──start()──► Running ──shutdown()──► Draining ──► Stopped
//!   └──────────────shutdown()──────────────────┘
//! ```

use crate::buffer::{Enqueued, EventBuffer};
use crate::config::Config;
use crate::delivery::{BackoffConfig, Dispatcher, ErrorReporter, RetryExecutor};
use crate::error::{Result, ShipperError};
use crate::event::PendingEvent;
use crate::metrics;
use crate::transport::BatchTransport;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Lifecycle of a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed; accepts events, timer not running
    Idle,
    /// Timer running
    Running,
    /// Shutdown in progress; new events are refused
    Draining,
    /// Final cycle done and transport shut down
    Stopped,
}

impl SchedulerState {
    fn accepts_events(self) -> bool {
        matches!(self, SchedulerState::Idle | SchedulerState::Running)
    }
}

/// What started a flush cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Timer,
    Manual,
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            FlushTrigger::Timer => "timer",
            FlushTrigger::Manual => "manual",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

/// Totals for one flush cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub batches: usize,
    pub events: usize,
    /// Batches that ended in anything but full success
    pub failed_batches: usize,
}

/// Owns the buffer and drives delivery
///
/// Dropping the scheduler without `shutdown()` aborts the timer and loses
/// whatever is still buffered.
pub struct FlushScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    buffer: EventBuffer,
    dispatcher: Dispatcher,
    batch_size: usize,
    flush_interval: Duration,
    state: watch::Sender<SchedulerState>,
    /// Held for the duration of a cycle
    cycle: tokio::sync::Mutex<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl FlushScheduler {
    /// Create an idle scheduler; call `start()` to run the timer
    ///
    /// # Errors
    /// Returns `ShipperError::Config` if `config` fails validation
    pub fn new(
        config: &Config,
        transport: Arc<dyn BatchTransport>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self> {
        config.validate()?;

        let executor = RetryExecutor::new(BackoffConfig::from(config));
        let (state, _) = watch::channel(SchedulerState::Idle);

        if let Some(m) = metrics::Metrics::get() {
            m.set_buffer_capacity(config.max_queue_size);
        }

        Ok(Self {
            inner: Arc::new(Inner {
                buffer: EventBuffer::new(config.max_queue_size),
                dispatcher: Dispatcher::new(transport, executor, reporter),
                batch_size: config.batch_size.max(1),
                flush_interval: config.flush_interval,
                state,
                cycle: tokio::sync::Mutex::new(()),
                timer: Mutex::new(None),
            }),
        })
    }

    /// Start the periodic flush timer
    ///
    /// No-op unless the scheduler is `Idle`. Fails outside a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ShipperError::Init(format!("flush timer needs a Tokio runtime: {e}")))?;

        let started = self.inner.state.send_if_modified(|state| {
            if *state == SchedulerState::Idle {
                *state = SchedulerState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            debug!(state = ?self.state(), "start ignored");
            return Ok(());
        }

        let handle = runtime.spawn(run_timer(Arc::clone(&self.inner)));
        *self.inner.timer.lock() = Some(handle);

        info!(
            flush_interval_ms = self.inner.flush_interval.as_millis() as u64,
            batch_size = self.inner.batch_size,
            capacity = self.inner.buffer.capacity(),
            transport = self.inner.dispatcher.transport().name(),
            "flush scheduler started"
        );
        Ok(())
    }

    /// Buffer an event for the next cycle
    ///
    /// Never blocks. Once shutdown has begun the event is discarded.
    pub fn enqueue(&self, event: PendingEvent) {
        let buffer = &self.inner.buffer;
        match buffer.enqueue(event) {
            Enqueued::Closed => {
                debug!(state = ?self.state(), "event discarded, scheduler is shutting down");
                return;
            }
            Enqueued::EvictedOldest => {
                metrics::try_record_dropped("overflow", 1);
                warn!(
                    capacity = buffer.capacity(),
                    dropped_total = buffer.dropped_count(),
                    "buffer full, oldest event dropped"
                );
            }
            Enqueued::Stored => {}
        }

        metrics::try_record_enqueued();
        metrics::try_set_buffer_size(buffer.len());
    }

    /// Run one flush cycle and wait for all its batches
    ///
    /// Queues behind a cycle already in flight. Returns immediately once
    /// the scheduler is stopped.
    pub async fn flush(&self) -> CycleStats {
        if self.state() == SchedulerState::Stopped {
            return CycleStats::default();
        }
        self.inner.run_cycle(FlushTrigger::Manual).await
    }

    /// Stop the timer, deliver everything still buffered and shut the
    /// transport down
    ///
    /// Safe to call more than once; later calls wait for the first to
    /// finish.
    pub async fn shutdown(&self) {
        let began = self.inner.state.send_if_modified(|state| {
            if state.accepts_events() {
                *state = SchedulerState::Draining;
                true
            } else {
                false
            }
        });

        if !began {
            let mut state = self.inner.state.subscribe();
            let _ = state.wait_for(|s| *s == SchedulerState::Stopped).await;
            return;
        }

        // From here on, whatever is buffered is exactly what the final cycle sends
        self.inner.buffer.close();
        info!(pending = self.inner.buffer.len(), "flush scheduler shutting down");

        let timer = self.inner.timer.lock().take();
        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                error!(error = %e, "flush timer task failed");
            }
        }

        let stats = self.inner.run_cycle(FlushTrigger::Shutdown).await;

        let transport = self.inner.dispatcher.transport();
        if let Err(e) = transport.shutdown().await {
            warn!(transport = transport.name(), error = %e, "transport shutdown failed");
        }

        self.inner.state.send_replace(SchedulerState::Stopped);
        info!(
            events = stats.events,
            batches = stats.batches,
            dropped_total = self.inner.buffer.dropped_count(),
            "flush scheduler stopped"
        );
    }

    pub fn state(&self) -> SchedulerState {
        *self.inner.state.borrow()
    }

    /// Events currently buffered
    pub fn len(&self) -> usize {
        self.inner.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.buffer.is_empty()
    }

    /// Events lost to overflow
    pub fn dropped_count(&self) -> u64 {
        self.inner.buffer.dropped_count()
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.inner.buffer
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.abort();
        }
    }
}

impl Inner {
    async fn run_cycle(&self, trigger: FlushTrigger) -> CycleStats {
        let _cycle = self.cycle.lock().await;
        let started = Instant::now();

        // Only what is buffered now; later arrivals wait for the next cycle
        let mut remaining = self.buffer.len();
        let mut batches = Vec::new();
        while remaining > 0 {
            let batch = self.buffer.drain(self.batch_size.min(remaining));
            if batch.is_empty() {
                break;
            }
            remaining -= batch.len();
            batches.push(batch);
        }
        metrics::try_set_buffer_size(self.buffer.len());

        if batches.is_empty() {
            return CycleStats::default();
        }

        let mut stats = CycleStats {
            batches: batches.len(),
            events: batches.iter().map(Vec::len).sum(),
            failed_batches: 0,
        };

        let sends = batches.into_iter().map(|batch| async move {
            let count = batch.len();
            let result = AssertUnwindSafe(self.dispatcher.send_batch(batch))
                .catch_unwind()
                .await;
            (count, result)
        });

        for (count, result) in join_all(sends).await {
            match result {
                Ok(disposition) => {
                    if !disposition.outcome.is_success() {
                        stats.failed_batches += 1;
                    }
                }
                Err(_) => {
                    stats.failed_batches += 1;
                    metrics::try_record_dropped("panicked", count as u64);
                    error!(
                        transport = self.dispatcher.transport().name(),
                        count = count,
                        "batch delivery panicked"
                    );
                }
            }
        }

        let elapsed = started.elapsed();
        metrics::try_record_flush(trigger.as_str(), elapsed.as_secs_f64());
        debug!(
            trigger = trigger.as_str(),
            batches = stats.batches,
            events = stats.events,
            failed_batches = stats.failed_batches,
            elapsed_ms = elapsed.as_millis() as u64,
            "flush cycle complete"
        );

        stats
    }
}

/// Background timer: one cycle per tick until the scheduler leaves `Running`
async fn run_timer(inner: Arc<Inner>) {
    let mut state = inner.state.subscribe();
    let period = inner.flush_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = left_running(&mut state) => break,
            _ = ticker.tick() => {
                inner.run_cycle(FlushTrigger::Timer).await;
            }
        }
    }

    debug!("flush timer stopped");
}

async fn left_running(state: &mut watch::Receiver<SchedulerState>) {
    let _ = state.wait_for(|s| *s != SchedulerState::Running).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::delivery::FailureLog;
    use crate::error::TransportError;
    use crate::transport::DeliveryOutcome;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every batch it is handed
    #[derive(Default)]
    struct RecordingTransport {
        batches: Mutex<Vec<Vec<PendingEvent>>>,
        shutdowns: AtomicUsize,
    }

    impl RecordingTransport {
        fn sent_ids(&self) -> Vec<u64> {
            self.batches
                .lock()
                .iter()
                .flatten()
                .map(|e| e.get("id").and_then(|v| v.as_u64()).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl BatchTransport for RecordingTransport {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(
            &self,
            events: &[PendingEvent],
        ) -> std::result::Result<DeliveryOutcome, TransportError> {
            self.batches.lock().push(events.to_vec());
            Ok(DeliveryOutcome::Success)
        }

        async fn shutdown(&self) -> std::result::Result<(), TransportError> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanickingTransport;

    #[async_trait]
    impl BatchTransport for PanickingTransport {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn send(
            &self,
            _: &[PendingEvent],
        ) -> std::result::Result<DeliveryOutcome, TransportError> {
            panic!("transport bug");
        }
    }

    fn event(id: u64) -> PendingEvent {
        PendingEvent::from_value(json!({ "id": id })).unwrap()
    }

    fn config() -> Config {
        Config::default()
            .with_flush_interval(Duration::from_millis(100))
            .with_batch_size(2)
            .with_max_queue_size(10)
    }

    fn scheduler(transport: Arc<RecordingTransport>) -> FlushScheduler {
        FlushScheduler::new(&config(), transport, FailureLog::shared(10)).unwrap()
    }

    #[tokio::test]
    async fn test_flush_before_start() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(transport.clone());

        for i in 0..5 {
            scheduler.enqueue(event(i));
        }
        let stats = scheduler.flush().await;

        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(
            stats,
            CycleStats {
                batches: 3,
                events: 5,
                failed_batches: 0
            }
        );
        assert_eq!(transport.sent_ids(), vec![0, 1, 2, 3, 4]);
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn test_flush_empty_buffer_sends_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(transport.clone());

        assert_eq!(scheduler.flush().await, CycleStats::default());
        assert!(transport.batches.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_periodically() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(transport.clone());
        scheduler.start().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Running);

        scheduler.enqueue(event(1));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(transport.sent_ids(), vec![1]);

        scheduler.enqueue(event(2));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.sent_ids(), vec![1, 2]);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(transport);

        scheduler.start().unwrap();
        scheduler.start().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Running);

        scheduler.shutdown().await;
        scheduler.start().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(transport);

        assert!(matches!(scheduler.start(), Err(ShipperError::Init(_))));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_refuses_new_events() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(transport.clone());
        scheduler.start().unwrap();

        for i in 0..7 {
            scheduler.enqueue(event(i));
        }
        scheduler.shutdown().await;

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(transport.sent_ids(), (0..7).collect::<Vec<_>>());
        assert_eq!(transport.shutdowns.load(Ordering::SeqCst), 1);

        scheduler.enqueue(event(99));
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.flush().await, CycleStats::default());
        assert_eq!(transport.sent_ids().len(), 7);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(transport.clone());
        scheduler.enqueue(event(1));

        tokio::join!(scheduler.shutdown(), scheduler.shutdown());
        scheduler.shutdown().await;

        assert_eq!(transport.sent_ids(), vec![1]);
        assert_eq!(transport.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overflow_counts_drops() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(transport.clone());

        for i in 0..15 {
            scheduler.enqueue(event(i));
        }

        assert_eq!(scheduler.len(), 10);
        assert_eq!(scheduler.dropped_count(), 5);

        scheduler.flush().await;
        assert_eq!(transport.sent_ids(), (5..15).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_transport_panic_is_contained() {
        let scheduler = FlushScheduler::new(
            &config(),
            Arc::new(PanickingTransport),
            FailureLog::shared(10),
        )
        .unwrap();
        scheduler.enqueue(event(1));
        scheduler.enqueue(event(2));
        scheduler.enqueue(event(3));

        let stats = scheduler.flush().await;

        assert_eq!(stats.batches, 2);
        assert_eq!(stats.failed_batches, 2);

        scheduler.enqueue(event(4));
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let transport = Arc::new(RecordingTransport::default());
        let config = config().with_flush_interval(Duration::ZERO);

        let result = FlushScheduler::new(&config, transport, FailureLog::shared(10));
        assert!(matches!(result, Err(ShipperError::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_races_producers_without_stranding() {
        use std::sync::atomic::AtomicBool;

        for _ in 0..20 {
            let transport = Arc::new(RecordingTransport::default());
            let config = config()
                .with_batch_size(100)
                .with_max_queue_size(1_000_000);
            let scheduler = Arc::new(
                FlushScheduler::new(&config, transport.clone(), FailureLog::shared(10)).unwrap(),
            );
            let stop = Arc::new(AtomicBool::new(false));

            let producers: Vec<_> = (0..4)
                .map(|p| {
                    let scheduler = Arc::clone(&scheduler);
                    let stop = Arc::clone(&stop);
                    std::thread::spawn(move || {
                        let mut i = 0u64;
                        while !stop.load(Ordering::SeqCst) {
                            scheduler.enqueue(event(p * 1_000_000 + i));
                            i += 1;
                        }
                    })
                })
                .collect();

            tokio::time::sleep(Duration::from_millis(2)).await;
            scheduler.shutdown().await;
            assert_eq!(scheduler.state(), SchedulerState::Stopped);

            // Producers are still running; nothing they add may stick
            tokio::time::sleep(Duration::from_millis(2)).await;
            stop.store(true, Ordering::SeqCst);
            for producer in producers {
                producer.join().unwrap();
            }

            let buffer = scheduler.buffer();
            assert!(scheduler.is_empty());
            assert_eq!(
                transport.sent_ids().len() as u64,
                buffer.total_enqueued() - buffer.dropped_count()
            );
        }
    }
}
