//! Audit log data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Audit severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// An appended, immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub action: String,
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub details: Map<String, Value>,
    pub severity: Severity,
}

/// An audit record before the logger stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub details: Map<String, Value>,
    pub severity: Severity,
}

impl NewAuditEntry {
    pub fn new(action: impl Into<String>, resource: impl Into<String>, severity: Severity) -> Self {
        Self {
            user_id: None,
            user_email: None,
            action: action.into(),
            resource: resource.into(),
            resource_id: None,
            ip: None,
            user_agent: None,
            details: Map::new(),
            severity,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Add one detail field.
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Merge a map of details, overwriting existing keys.
    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details.extend(details);
        self
    }

    pub(crate) fn stamp(self, timestamp: DateTime<Utc>) -> AuditLogEntry {
        AuditLogEntry {
            timestamp,
            user_id: self.user_id,
            user_email: self.user_email,
            action: self.action,
            resource: self.resource,
            resource_id: self.resource_id,
            ip: self.ip,
            user_agent: self.user_agent,
            details: self.details,
            severity: self.severity,
        }
    }
}

/// Filters for [`AuditLogger::query`](super::AuditLogger::query). Unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuditQuery {
    pub user_id: Option<String>,
    /// Substring match on the action.
    pub action: Option<String>,
    pub resource: Option<String>,
    pub severity: Option<Severity>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.user_id
            .as_deref()
            .map_or(true, |u| entry.user_id.as_deref() == Some(u))
            && self.action.as_deref().map_or(true, |a| entry.action.contains(a))
            && self.resource.as_deref().map_or(true, |r| entry.resource == r)
            && self.severity.map_or(true, |s| entry.severity == s)
            && self.start_date.map_or(true, |d| entry.timestamp >= d)
            && self.end_date.map_or(true, |d| entry.timestamp <= d)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCount {
    pub action: String,
    pub count: usize,
}

/// Aggregates over a reporting window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct AuditStats {
    pub total_events: usize,
    pub critical_events: usize,
    pub high_severity_events: usize,
    pub auth_events: usize,
    pub failed_logins: usize,
    pub unique_ips: usize,
    pub top_actions: Vec<ActionCount>,
}
