//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gate, audit log, performance monitor produce:
//!     → logging.rs (structured log events, `security_alert` target)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Per-request and per-call timings:
//!     → instrument.rs (wrappers around arbitrary calls)
//!     → performance.rs (capped buffer, alerts, percentiles, reports)
//!         ← memory.rs (process memory snapshot per metric)
//! ```
//!
//! # Design Decisions
//! - Metrics are cheap (atomic increments) and no-ops without a recorder
//! - Alert thresholds can change at runtime without losing history

pub mod instrument;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod performance;

pub use performance::{
    AlertKind, MetricFilter, MetricSample, PerformanceAlert, PerformanceMetric, PerformanceMonitor,
    PerformanceStats,
};
