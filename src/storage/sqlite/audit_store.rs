//! SQLite AuditStore implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sea_query::{
    Alias, Asterisk, Cond, Expr, Func, Order, Query, SelectStatement, SimpleExpr,
    SqliteQueryBuilder,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::intake_store::sql_order;
use super::{
    format_timestamp, get_count, get_enum, get_opt_json, get_opt_uuid, get_timestamp, get_uuid,
    now,
};
use crate::models::{
    AuditAction, AuditLog, AuditLogView, ClientIntakeRef, NewAuditLog, Page, Pagination,
    UserActivity, UserRef,
};
use crate::storage::schema::{AuditLogs, ClientIntakes, Users};
use crate::storage::{AuditQuery, AuditSortField, AuditStore, Result};

const USER_USERNAME: &str = "user_username";
const USER_DISPLAY_NAME: &str = "user_display_name";
const INTAKE_LEGAL_NAME: &str = "intake_legal_name";
const INTAKE_EMAIL: &str = "intake_email";
const ENTRY_COUNT: &str = "entry_count";

/// SQLite-backed audit store. Rows are only ever inserted.
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    /// Create a new SQLite audit store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Audit rows joined with the acting user and referenced intake.
    fn joined_select() -> SelectStatement {
        Query::select()
            .column((AuditLogs::Table, Asterisk))
            .expr_as(
                Expr::col((Users::Table, Users::Username)),
                Alias::new(USER_USERNAME),
            )
            .expr_as(
                Expr::col((Users::Table, Users::DisplayName)),
                Alias::new(USER_DISPLAY_NAME),
            )
            .expr_as(
                Expr::col((ClientIntakes::Table, ClientIntakes::LegalName)),
                Alias::new(INTAKE_LEGAL_NAME),
            )
            .expr_as(
                Expr::col((ClientIntakes::Table, ClientIntakes::Email)),
                Alias::new(INTAKE_EMAIL),
            )
            .from(AuditLogs::Table)
            .left_join(
                Users::Table,
                Expr::col((Users::Table, Users::Id)).equals((AuditLogs::Table, AuditLogs::UserId)),
            )
            .left_join(
                ClientIntakes::Table,
                Expr::col((ClientIntakes::Table, ClientIntakes::Id))
                    .equals((AuditLogs::Table, AuditLogs::ClientIntakeId)),
            )
            .to_owned()
    }

    fn log_from_row(row: &SqliteRow) -> Result<AuditLog> {
        Ok(AuditLog {
            id: get_uuid(row, "id")?,
            action: get_enum(row, "action", AuditAction::parse)?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            old_values: get_opt_json(row, "old_values")?,
            new_values: get_opt_json(row, "new_values")?,
            user_id: get_opt_uuid(row, "user_id")?,
            client_intake_id: get_opt_uuid(row, "client_intake_id")?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            timestamp: get_timestamp(row, "timestamp")?,
        })
    }

    fn view_from_row(row: &SqliteRow) -> Result<AuditLogView> {
        let log = Self::log_from_row(row)?;

        let username: Option<String> = row.try_get(USER_USERNAME)?;
        let user = match (log.user_id, username) {
            (Some(id), Some(username)) => Some(UserRef {
                id,
                username,
                display_name: row
                    .try_get::<Option<String>, _>(USER_DISPLAY_NAME)?
                    .unwrap_or_default(),
            }),
            _ => None,
        };

        let legal_name: Option<String> = row.try_get(INTAKE_LEGAL_NAME)?;
        let client_intake = match (log.client_intake_id, legal_name) {
            (Some(id), Some(legal_name)) => Some(ClientIntakeRef {
                id,
                legal_name,
                email: row.try_get(INTAKE_EMAIL)?,
            }),
            _ => None,
        };

        Ok(AuditLogView {
            log,
            user,
            client_intake,
        })
    }

    async fn fetch_views(&self, query: &str) -> Result<Vec<AuditLogView>> {
        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::view_from_row).collect()
    }

    async fn fetch_count(&self, query: &str) -> Result<u64> {
        let row = sqlx::query(query).fetch_one(&self.pool).await?;
        get_count(&row, 0)
    }

    fn filter_condition(query: &AuditQuery) -> Cond {
        let mut cond = Cond::all();
        if let Some(action) = query.action {
            cond = cond.add(Expr::col((AuditLogs::Table, AuditLogs::Action)).eq(action.as_str()));
        }
        if let Some(entity_type) = &query.entity_type {
            cond = cond.add(
                Expr::col((AuditLogs::Table, AuditLogs::EntityType)).eq(entity_type.as_str()),
            );
        }
        if let Some(user_id) = query.user_id {
            cond = cond
                .add(Expr::col((AuditLogs::Table, AuditLogs::UserId)).eq(user_id.to_string()));
        }
        if let Some(from) = &query.from {
            cond = cond.add(
                Expr::col((AuditLogs::Table, AuditLogs::Timestamp)).gte(format_timestamp(from)),
            );
        }
        if let Some(until) = &query.until {
            cond = cond.add(
                Expr::col((AuditLogs::Table, AuditLogs::Timestamp)).lte(format_timestamp(until)),
            );
        }
        cond
    }

    fn sort_column(field: AuditSortField) -> AuditLogs {
        match field {
            AuditSortField::Timestamp => AuditLogs::Timestamp,
            AuditSortField::Action => AuditLogs::Action,
            AuditSortField::EntityType => AuditLogs::EntityType,
        }
    }

    /// Insertion order, used to break timestamp ties.
    fn rowid() -> SimpleExpr {
        Expr::cust("audit_logs.rowid")
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, entry: NewAuditLog) -> Result<AuditLog> {
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
            timestamp: now(),
        };

        let old_values = log.old_values.as_ref().map(serde_json::to_string).transpose()?;
        let new_values = log.new_values.as_ref().map(serde_json::to_string).transpose()?;

        let query = Query::insert()
            .into_table(AuditLogs::Table)
            .columns([
                AuditLogs::Id,
                AuditLogs::Action,
                AuditLogs::EntityType,
                AuditLogs::EntityId,
                AuditLogs::OldValues,
                AuditLogs::NewValues,
                AuditLogs::UserId,
                AuditLogs::ClientIntakeId,
                AuditLogs::IpAddress,
                AuditLogs::UserAgent,
                AuditLogs::Timestamp,
            ])
            .values_panic([
                log.id.to_string().into(),
                log.action.as_str().into(),
                log.entity_type.clone().into(),
                log.entity_id.clone().into(),
                old_values.into(),
                new_values.into(),
                log.user_id.map(|id| id.to_string()).into(),
                log.client_intake_id.map(|id| id.to_string()).into(),
                log.ip_address.clone().into(),
                log.user_agent.clone().into(),
                format_timestamp(&log.timestamp).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(log)
    }

    async fn query(&self, query: &AuditQuery) -> Result<Page<AuditLogView>> {
        let cond = Self::filter_condition(query);
        let order = sql_order(query.sort_order);

        let count_query = Query::select()
            .expr(Func::count(Expr::col(Asterisk)))
            .from(AuditLogs::Table)
            .cond_where(cond.clone())
            .to_string(SqliteQueryBuilder);

        let Some(offset) = Pagination::offset(query.page, query.limit) else {
            let total = self.fetch_count(&count_query).await?;
            return Ok(Page::empty(query.page, query.limit, total));
        };

        let page_query = Self::joined_select()
            .cond_where(cond)
            .order_by(
                (AuditLogs::Table, Self::sort_column(query.sort_by)),
                order.clone(),
            )
            .order_by_expr(Self::rowid(), order)
            .limit(query.limit)
            .offset(offset)
            .to_string(SqliteQueryBuilder);

        let (total, items) = tokio::try_join!(
            self.fetch_count(&count_query),
            self.fetch_views(&page_query)
        )?;

        Ok(Page {
            items,
            pagination: Pagination::new(query.page, query.limit, total),
        })
    }

    async fn history(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLogView>> {
        let query = Self::joined_select()
            .and_where(Expr::col((AuditLogs::Table, AuditLogs::EntityType)).eq(entity_type))
            .and_where(Expr::col((AuditLogs::Table, AuditLogs::EntityId)).eq(entity_id))
            .order_by((AuditLogs::Table, AuditLogs::Timestamp), Order::Asc)
            .order_by_expr(Self::rowid(), Order::Asc)
            .to_string(SqliteQueryBuilder);

        self.fetch_views(&query).await
    }

    async fn count(&self) -> Result<u64> {
        let query = Query::select()
            .expr(Func::count(Expr::col(Asterisk)))
            .from(AuditLogs::Table)
            .to_string(SqliteQueryBuilder);

        self.fetch_count(&query).await
    }

    async fn action_counts(&self) -> Result<BTreeMap<String, u64>> {
        let query = Query::select()
            .column(AuditLogs::Action)
            .expr(Func::count(Expr::col(Asterisk)))
            .from(AuditLogs::Table)
            .group_by_col(AuditLogs::Action)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let action: String = row.try_get(0)?;
            counts.insert(action, get_count(&row, 1)?);
        }
        Ok(counts)
    }

    async fn top_users(&self, limit: u64) -> Result<Vec<UserActivity>> {
        let query = Query::select()
            .column((AuditLogs::Table, AuditLogs::UserId))
            .expr_as(
                Expr::col((Users::Table, Users::Username)),
                Alias::new(USER_USERNAME),
            )
            .expr_as(
                Expr::col((Users::Table, Users::DisplayName)),
                Alias::new(USER_DISPLAY_NAME),
            )
            .expr_as(Func::count(Expr::col(Asterisk)), Alias::new(ENTRY_COUNT))
            .from(AuditLogs::Table)
            .left_join(
                Users::Table,
                Expr::col((Users::Table, Users::Id)).equals((AuditLogs::Table, AuditLogs::UserId)),
            )
            .and_where(Expr::col((AuditLogs::Table, AuditLogs::UserId)).is_not_null())
            .group_by_col((AuditLogs::Table, AuditLogs::UserId))
            .group_by_col((Users::Table, Users::Username))
            .group_by_col((Users::Table, Users::DisplayName))
            .order_by(Alias::new(ENTRY_COUNT), Order::Desc)
            .order_by((AuditLogs::Table, AuditLogs::UserId), Order::Asc)
            .limit(limit)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<UserActivity> {
                Ok(UserActivity {
                    user_id: get_uuid(row, "user_id")?,
                    username: row.try_get(USER_USERNAME)?,
                    display_name: row.try_get(USER_DISPLAY_NAME)?,
                    count: get_count(row, 3)?,
                })
            })
            .collect()
    }

    async fn recent(&self, limit: u64) -> Result<Vec<AuditLogView>> {
        let query = Self::joined_select()
            .order_by((AuditLogs::Table, AuditLogs::Timestamp), Order::Desc)
            .order_by_expr(Self::rowid(), Order::Desc)
            .limit(limit)
            .to_string(SqliteQueryBuilder);

        self.fetch_views(&query).await
    }
}
