//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → HTTP server stops accepting, drains
//!               → maintenance tasks exit their loops
//!
//! Maintenance (maintenance.rs):
//!     hourly housekeeping, 5-minute pruning, 1-minute error-rate check
//! ```

pub mod maintenance;
pub mod shutdown;
pub mod signals;

pub use maintenance::spawn_maintenance;
pub use shutdown::Shutdown;
