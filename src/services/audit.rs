//! Audit recording and audit queries.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use super::{RequestContext, Result};
use crate::models::{AuditAction, AuditLogView, AuditStats, NewAuditLog, Page};
use crate::storage::{AuditQuery, AuditStore};

/// Number of entries in each stats ranking.
const STATS_TOP_N: u64 = 10;

/// One change to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub entity_type: &'static str,
    pub entity_id: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub client_intake_id: Option<Uuid>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, entity_type: &'static str, entity_id: impl ToString) -> Self {
        Self {
            action,
            entity_type,
            entity_id: entity_id.to_string(),
            old_values: None,
            new_values: None,
            client_intake_id: None,
        }
    }

    pub fn before<T: Serialize>(mut self, value: &T) -> Self {
        self.old_values = snapshot(value);
        self
    }

    pub fn after<T: Serialize>(mut self, value: &T) -> Self {
        self.new_values = snapshot(value);
        self
    }

    pub fn intake(mut self, id: Uuid) -> Self {
        self.client_intake_id = Some(id);
        self
    }
}

fn snapshot<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    match serde_json::to_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            error!(error = %e, "failed to serialize audit snapshot");
            None
        }
    }
}

/// Writes audit entries without ever failing the caller.
///
/// A failed write is logged at error level and dropped, so a broken audit
/// trail never blocks the business operation that triggered it.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, ctx: &RequestContext, event: AuditEvent) {
        let entry = NewAuditLog {
            action: event.action,
            entity_type: event.entity_type.to_string(),
            entity_id: event.entity_id,
            old_values: event.old_values,
            new_values: event.new_values,
            user_id: ctx.actor.as_ref().map(|a| a.id),
            client_intake_id: event.client_intake_id,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        };
        let (action, entity_type, entity_id) =
            (entry.action, event.entity_type, entry.entity_id.clone());

        match self.store.append(entry).await {
            Ok(log) => debug!(id = %log.id, %action, entity_type, %entity_id, "audit entry written"),
            Err(e) => error!(
                %action,
                entity_type,
                %entity_id,
                error = %e,
                "failed to write audit entry"
            ),
        }
    }
}

/// Read-only views over the audit trail. Every call requires an actor.
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuditStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub async fn query(&self, ctx: &RequestContext, query: &AuditQuery) -> Result<Page<AuditLogView>> {
        ctx.require_actor()?;
        Ok(self.store.query(query).await?)
    }

    /// Totals, per-action counts, busiest users and newest entries.
    pub async fn stats(&self, ctx: &RequestContext) -> Result<AuditStats> {
        ctx.require_actor()?;
        let (total_logs, action_counts, top_users, recent_activity) = tokio::try_join!(
            self.store.count(),
            self.store.action_counts(),
            self.store.top_users(STATS_TOP_N),
            self.store.recent(STATS_TOP_N),
        )?;

        Ok(AuditStats {
            total_logs,
            action_counts,
            top_users,
            recent_activity,
        })
    }

    /// Full history of one entity, oldest first.
    pub async fn history(
        &self,
        ctx: &RequestContext,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditLogView>> {
        ctx.require_actor()?;
        Ok(self.store.history(entity_type, entity_id).await?)
    }
}
