//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → gate.rs (orchestrates the checks below, strict order)
//!         → blocklist.rs (dynamic blocks, suspicion escalation)
//!         → rate_limit.rs (fixed-window counters per key)
//!         → access_control.rs (admin / API path policy)
//!     → headers.rs (security headers on pass-through)
//!     → application handler
//! ```
//!
//! # Design Decisions
//! - State is per process; nothing is shared across instances
//! - Fail open: an internal failure allows the request and is audited
//! - No trust in client input beyond presence checks

pub mod access_control;
pub mod blocklist;
pub mod gate;
pub mod headers;
pub mod rate_limit;

pub use gate::{Denial, DenialKind, GatePolicy, RequestInfo, SecurityGate, SecurityStats, Verdict};
