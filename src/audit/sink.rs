//! External destination for critical audit entries.
//!
//! Forwarding is fire-and-forget: the logger spawns the future and never
//! awaits it on the request path. Failures are logged locally and dropped.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::audit::types::AuditLogEntry;
use crate::error::SinkError;

pub type SinkFuture = Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'static>>;

/// Receives critical audit entries.
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    fn forward(&self, entry: AuditLogEntry) -> SinkFuture;
}

/// Posts entries as JSON to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl AuditSink for HttpSink {
    fn forward(&self, entry: AuditLogEntry) -> SinkFuture {
        let request = self.client.post(&self.url).json(&entry);
        Box::pin(async move {
            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(SinkError::Status(status.as_u16()))
            }
        })
    }
}
