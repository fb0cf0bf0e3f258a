use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub action: String,
    pub resource: String,
    pub description: String,
    pub severity: Severity,
    pub metadata: Value,
}

/// Fire-and-forget audit trail. Implementations swallow their own failures.
pub trait AuditSink: Send + Sync {
    fn log_event(&self, event: AuditEvent);
}

/// Emits audit events as `tracing` events under the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_event(&self, event: AuditEvent) {
        let AuditEvent {
            action,
            resource,
            description,
            severity,
            metadata,
        } = event;
        match severity {
            Severity::Info => {
                info!(target: "audit", %action, %resource, %metadata, "{description}")
            }
            Severity::Warning => {
                warn!(target: "audit", %action, %resource, %metadata, "{description}")
            }
            Severity::Error => {
                error!(target: "audit", %action, %resource, %metadata, "{description}")
            }
        }
    }
}

/// Keeps events in memory; for tests and the CLI summary.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn log_event(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
