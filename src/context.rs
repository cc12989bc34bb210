//! Process-wide gate state.
//!
//! Built once at startup and shared as `Arc<GateContext>` by the HTTP
//! middleware, the admin routes and the maintenance tasks. Tests build a
//! fresh context each so no state leaks between them.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::audit::{AuditLogger, AuditSink, HttpSink};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, GateConfig};
use crate::observability::memory::{MemoryProbe, ProcessMemory};
use crate::observability::performance::PerformanceMonitor;
use crate::security::{GatePolicy, SecurityGate};

#[derive(Debug)]
pub struct GateContext {
    pub gate: SecurityGate,
    pub audit: Arc<AuditLogger>,
    pub performance: Arc<PerformanceMonitor>,
    pub clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
}

impl GateContext {
    /// Context on the system clock, sampling process memory, with the HTTP
    /// audit sink when one is configured.
    pub fn new(config: GateConfig) -> Result<Self, ConfigError> {
        let sink: Option<Arc<dyn AuditSink>> = match &config.audit_logging.sink_url {
            Some(url) => match HttpSink::new(url.as_str()) {
                Ok(sink) => Some(Arc::new(sink)),
                Err(e) => {
                    tracing::warn!(error = %e, "Audit sink unavailable, critical entries stay local");
                    None
                }
            },
            None => None,
        };
        Self::with_parts(config, Arc::new(SystemClock), Arc::new(ProcessMemory::new()), sink)
    }

    pub fn with_parts(
        config: GateConfig,
        clock: Arc<dyn Clock>,
        memory: Arc<dyn MemoryProbe>,
        sink: Option<Arc<dyn AuditSink>>,
    ) -> Result<Self, ConfigError> {
        let policy = GatePolicy::compile(config)?;
        let config = &policy.config;

        let mut audit = AuditLogger::new(
            config.audit_logging.max_entries,
            clock.clone(),
            config.environment,
        );
        if let Some(sink) = sink {
            audit = audit.with_sink(sink);
        }
        let audit = Arc::new(audit);
        let performance = Arc::new(PerformanceMonitor::new(
            &config.performance,
            clock.clone(),
            memory,
        ));

        let started_at = clock.now();
        let gate = SecurityGate::new(policy, clock.clone(), audit.clone(), performance.clone());

        Ok(Self {
            gate,
            audit,
            performance,
            clock,
            started_at,
        })
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> GateConfig {
        self.gate.policy().config.clone()
    }

    pub fn uptime_secs(&self) -> i64 {
        (self.clock.now() - self.started_at).num_seconds()
    }
}
