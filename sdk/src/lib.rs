//! MarginDash - buffered usage-event shipper
//!
//! Producers hand usage events to a bounded in-memory buffer; a background
//! scheduler drains it in batches and ships them to the MarginDash
//! collector, retrying transient failures and reporting the rest.
//!
//! # Architecture
//!
//! ```text
//! track/enqueue ──► EventBuffer ──► FlushScheduler ──► Dispatcher ──► BatchTransport
//!  (producers)      (drop-oldest)   (timer, flush,     (retry,          (HTTP, stdout)
//!                                    shutdown)          classify)
//!                                                          │
//!                                                          └──► ErrorReporter
//! ```
//!
//! Producers never block and never see an error. Lost events are counted
//! (overflow) or reported (delivery failure).

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod buffer;
pub mod client;
pub mod config;
pub mod delivery;
pub mod error;
pub mod event;
pub mod metrics;
pub mod providers;
pub mod scheduler;
pub mod serializer;
pub mod transport;

pub use buffer::{Enqueued, EventBuffer};
pub use client::MarginDash;
pub use config::{Config, LogFormat};
pub use delivery::{
    BackoffConfig, ErrorReport, ErrorReporter, FailureLog, LogReporter, RetryExecutor,
};
pub use error::{Result, ShipperError, TransportError};
pub use event::PendingEvent;
pub use providers::{Provider, UsageData};
pub use scheduler::{CycleStats, FlushScheduler, SchedulerState};
pub use serializer::{serialize_event, EventPayload, VendorResponse};
pub use transport::{BatchTransport, DeliveryOutcome, HttpTransport, StdoutTransport};
