//! Audit subsystem.
//!
//! # Data Flow
//! ```text
//! Gate decisions, application events
//!     → logger.rs (stamp, append to capped buffer)
//!     → critical entries: `security_alert` tracing target
//!     → production: sink.rs (fire-and-forget forward)
//!
//! Reporting:
//!     → query (filters, newest first)
//!     → stats (per timeframe aggregates)
//! ```

pub mod logger;
pub mod sink;
pub mod types;

pub use logger::AuditLogger;
pub use sink::{AuditSink, HttpSink};
pub use types::{ActionCount, AuditLogEntry, AuditQuery, AuditStats, NewAuditEntry, Severity};
