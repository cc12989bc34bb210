//! Request security and observability gate.
//!
//! Every inbound request passes through one [`SecurityGate`]: IP blocklist,
//! abuse escalation, fixed-window rate limiting and path policy. Each outcome
//! is recorded by the [`PerformanceMonitor`] and the [`AuditLogger`].

pub mod admin;
pub mod audit;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use audit::AuditLogger;
pub use config::schema::GateConfig;
pub use context::GateContext;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::PerformanceMonitor;
pub use security::SecurityGate;
