//! Audit trail for permission decisions.
//!
//! Sinks are synchronous and infallible: recording must never block or fail a decision.

use crate::delegate::AccessType;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Log target used by [`LogAuditSink`].
pub const AUDIT_LOG_TARGET: &str = "access_audit";

/// One audited permission decision.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct AuditRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub resource: String,
    pub action: String,
    pub allowed: bool,
    /// Deny reason code, `None` on allow.
    pub reason: Option<String>,
    /// Role that granted the access, or whose grant was refused last.
    pub role: Option<String>,
    pub granted_by: Vec<String>,
    pub access_type: Option<AccessType>,
    pub evaluation_time_ms: f64,
    /// Boundary violations and protected-resource denials are flagged for review.
    pub flagged_for_review: bool,
}

impl AuditRecord {
    pub fn new(
        actor_id: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
        allowed: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            actor_id: actor_id.into(),
            resource: resource.into(),
            action: action.into(),
            allowed,
            reason: None,
            role: None,
            granted_by: Vec::new(),
            access_type: None,
            evaluation_time_ms: 0.0,
            flagged_for_review: false,
        }
    }
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _record: AuditRecord) {}
}

/// Writes records through the `log` facade under [`AUDIT_LOG_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, record: AuditRecord) {
        let reason = record.reason.as_deref().unwrap_or("-");
        let role = record.role.as_deref().unwrap_or("-");
        if record.flagged_for_review {
            warn!(
                target: AUDIT_LOG_TARGET,
                "[{}] actor={} resource={} action={} allowed={} reason={} role={} eval_ms={:.3} REVIEW",
                record.id, record.actor_id, record.resource, record.action,
                record.allowed, reason, role, record.evaluation_time_ms
            );
        } else {
            info!(
                target: AUDIT_LOG_TARGET,
                "[{}] actor={} resource={} action={} allowed={} reason={} role={} eval_ms={:.3}",
                record.id, record.actor_id, record.resource, record.action,
                record.allowed, reason, role, record.evaluation_time_ms
            );
        }
    }
}

/// Forwards records to an unbounded channel for a background consumer.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::UnboundedSender<AuditRecord>,
}

impl ChannelAuditSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AuditRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, record: AuditRecord) {
        // A closed receiver only means nobody is listening any more.
        let _ = self.sender.send(record);
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}
