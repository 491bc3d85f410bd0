//! Observability for Courier.
//!
//! - **Logging**: `tracing` subscriber setup with JSON, pretty or compact output
//! - **Metrics**: dispatch, send and receive counters through the `metrics` facade
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `courier_messages_dispatched_total` | Counter | `message`, `outcome` | Dispatches |
//! | `courier_dispatch_duration_seconds` | Histogram | `message` | Dispatch latency |
//! | `courier_messages_sent_total` | Counter | `transport`, `message` | Sends |
//! | `courier_messages_received_total` | Counter | `transport`, `outcome` | Worker receipts |
//! | `courier_dispatches_in_flight` | Gauge | - | Running dispatches |

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{describe_metrics, Outcome};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
