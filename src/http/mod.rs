//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → middleware.rs (security gate)
//!         → request.rs (client IP, credentials, identity)
//!         → denied: response.rs (JSON denial, rate-limit headers)
//!         → allowed: application handler + security headers
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use server::HttpServer;
