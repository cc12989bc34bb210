//! Error types for the gate.
//!
//! Denials (rate limited, blocked, unauthorized) are not errors: they are
//! ordinary [`Verdict`](crate::security::gate::Verdict) values. The types here
//! cover the unexpected paths.

use thiserror::Error;

/// Unexpected failure inside the gate's own logic.
///
/// Never surfaced to the client: the middleware logs it as
/// `security.middleware_error` and lets the request through.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    #[error("failed to build response: {0}")]
    Response(#[from] axum::http::Error),

    #[error("gate check panicked: {0}")]
    Panicked(String),
}

/// Failure forwarding an audit entry to the external sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sink responded with status {0}")]
    Status(u16),
}

impl GateError {
    /// Convert a caught panic payload into an error.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        GateError::Panicked(message)
    }
}
