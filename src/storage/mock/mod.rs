//! Mock storage implementations for testing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuditQuery, AuditStore, Result, StoreError};
use crate::models::{AuditLog, AuditLogView, NewAuditLog, Page, Pagination, UserActivity};

/// In-memory audit store with a failure switch.
#[derive(Default)]
pub struct MockAuditStore {
    logs: RwLock<Vec<AuditLog>>,
    fail_on_append: RwLock<bool>,
}

impl MockAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.fail_on_append.write().await = fail;
    }

    /// Every entry appended so far, oldest first.
    pub async fn logs(&self) -> Vec<AuditLog> {
        self.logs.read().await.clone()
    }

    fn view(log: &AuditLog) -> AuditLogView {
        AuditLogView {
            log: log.clone(),
            user: None,
            client_intake: None,
        }
    }
}

#[async_trait]
impl AuditStore for MockAuditStore {
    async fn append(&self, entry: NewAuditLog) -> Result<AuditLog> {
        if *self.fail_on_append.read().await {
            return Err(StoreError::Unavailable("mock audit store offline".to_string()));
        }
        let log = AuditLog {
            id: Uuid::new_v4(),
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            old_values: entry.old_values,
            new_values: entry.new_values,
            user_id: entry.user_id,
            client_intake_id: entry.client_intake_id,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            timestamp: chrono::Utc::now(),
        };
        self.logs.write().await.push(log.clone());
        Ok(log)
    }

    async fn query(&self, query: &AuditQuery) -> Result<Page<AuditLogView>> {
        let logs = self.logs.read().await;
        let matching: Vec<&AuditLog> = logs
            .iter()
            .filter(|l| query.action.is_none_or(|a| l.action == a))
            .filter(|l| {
                query
                    .entity_type
                    .as_deref()
                    .is_none_or(|t| l.entity_type == t)
            })
            .filter(|l| query.user_id.is_none_or(|u| l.user_id == Some(u)))
            .collect();

        let total = matching.len() as u64;
        let skip = Pagination::offset(query.page, query.limit)
            .and_then(|offset| usize::try_from(offset).ok())
            .unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .rev()
            .skip(skip)
            .take(query.limit as usize)
            .map(Self::view)
            .collect();

        Ok(Page {
            items,
            pagination: Pagination::new(query.page, query.limit, total),
        })
    }

    async fn history(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLogView>> {
        Ok(self
            .logs
            .read()
            .await
            .iter()
            .filter(|l| l.entity_type == entity_type && l.entity_id == entity_id)
            .map(Self::view)
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.logs.read().await.len() as u64)
    }

    async fn action_counts(&self) -> Result<BTreeMap<String, u64>> {
        let mut counts = BTreeMap::new();
        for log in self.logs.read().await.iter() {
            *counts.entry(log.action.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn top_users(&self, limit: u64) -> Result<Vec<UserActivity>> {
        let mut counts: BTreeMap<Uuid, u64> = BTreeMap::new();
        for log in self.logs.read().await.iter() {
            if let Some(user_id) = log.user_id {
                *counts.entry(user_id).or_insert(0) += 1;
            }
        }
        let mut users: Vec<UserActivity> = counts
            .into_iter()
            .map(|(user_id, count)| UserActivity {
                user_id,
                username: None,
                display_name: None,
                count,
            })
            .collect();
        users.sort_by(|a, b| b.count.cmp(&a.count));
        users.truncate(limit as usize);
        Ok(users)
    }

    async fn recent(&self, limit: u64) -> Result<Vec<AuditLogView>> {
        Ok(self
            .logs
            .read()
            .await
            .iter()
            .rev()
            .take(limit as usize)
            .map(Self::view)
            .collect())
    }
}
