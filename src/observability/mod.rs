//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Relay outcome (hit / miss / blocked, status, elapsed)
//!     → telemetry.rs (fan out one RequestRecord)
//!         → metrics.rs ProxyStats (process-lifetime counters, console `stats`)
//!         → metrics.rs facade (Prometheus, when enabled)
//!         → AccessLogSink (one structured log event)
//!         → CsvTimingSink (timing row appended to disk)
//!
//! All subsystems:
//!     → logging.rs (tracing subscriber setup)
//! ```
//!
//! # Design Decisions
//! - Counters are atomics inside an explicitly shared object, never statics
//! - Each request is recorded exactly once
//! - Sinks are trait objects so tests can capture records in memory

pub mod logging;
pub mod metrics;
pub mod telemetry;

pub use metrics::{ProxyStats, StatsSnapshot};
pub use telemetry::{AccessLogSink, CsvTimingSink, Outcome, RequestRecord, Telemetry, TelemetrySink};
