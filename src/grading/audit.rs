use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::RequestContext;

/// Mutation kinds recorded to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Archived,
    Linked,
}

impl AuditAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Archived => "archived",
            Self::Linked => "linked",
        }
    }
}

/// One audit-log entry: who did what to which record, with before/after
/// snapshots for compliance review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub organization_id: String,
    pub actor_id: String,
    pub action: AuditAction,
    pub entity_kind: &'static str,
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        ctx: &RequestContext,
        action: AuditAction,
        entity_kind: &'static str,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: ctx.organization_id.clone(),
            actor_id: ctx.actor_id.clone(),
            action,
            entity_kind,
            entity_id: entity_id.into(),
            before: None,
            after: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_before(mut self, snapshot: Value) -> Self {
        self.before = Some(snapshot);
        self
    }

    pub fn with_after(mut self, snapshot: Value) -> Self {
        self.after = Some(snapshot);
        self
    }
}

/// Outbound audit hook. Every configuration mutation and every run
/// transition is reported here before the call returns to the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Audit dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Sink that forwards events to the tracing log, for deployments without a
/// durable audit store attached.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            organization = %event.organization_id,
            actor = %event.actor_id,
            action = event.action.label(),
            entity_kind = event.entity_kind,
            entity_id = %event.entity_id,
            "audit event"
        );
        Ok(())
    }
}
