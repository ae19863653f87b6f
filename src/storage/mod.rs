//! Storage interfaces and implementations.
//!
//! Services depend only on the traits defined here. The SQLite
//! implementations share one injected [`sqlx::SqlitePool`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AuditAction, AuditLog, AuditLogView, ClientIntake, ClientType, Department, IntakeSummary,
    NewAuditLog, NewDepartment, NewIntake, NewRole, NewStaff, NewUser, Page, RamisStatus, Role,
    SortOrder, Staff, UpdateDepartment, UpdateRole, UpdateStaff, User, UserActivity,
};

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod schema;
pub mod sqlite;

pub use sqlite::{
    connect, init_schema, SqliteAuditStore, SqliteIntakeStore, SqliteStaffStore,
};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for transient infrastructure failures worth retrying.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_) => StoreError::Unavailable(e.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Database(e),
        }
    }
}

/// Sortable intake columns, by JSON name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IntakeSortField {
    LegalName,
    TradeName,
    Type,
    OwnerName,
    Email,
    City,
    Country,
    Industry,
    Priority,
    RamisStatus,
    #[default]
    CreatedAt,
    UpdatedAt,
    SubmittedAt,
}

impl IntakeSortField {
    /// Unknown names fall back to `createdAt`.
    pub fn parse(name: &str) -> Self {
        match name {
            "legalName" => Self::LegalName,
            "tradeName" => Self::TradeName,
            "type" => Self::Type,
            "ownerName" => Self::OwnerName,
            "email" => Self::Email,
            "city" => Self::City,
            "country" => Self::Country,
            "industry" => Self::Industry,
            "priority" => Self::Priority,
            "ramisStatus" => Self::RamisStatus,
            "updatedAt" => Self::UpdatedAt,
            "submittedAt" => Self::SubmittedAt,
            _ => Self::CreatedAt,
        }
    }
}

/// Filter, sort and page parameters for intake listings.
///
/// Soft-deleted intakes are always excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeQuery {
    pub page: u64,
    pub limit: u64,
    pub client_type: Option<ClientType>,
    pub ramis_status: Option<RamisStatus>,
    /// Membership test against `servicesSelected`.
    pub service: Option<String>,
    /// Membership test against `taxTypes`.
    pub tax_type: Option<String>,
    /// Case-insensitive substring of legal name, email or owner name.
    pub search: Option<String>,
    pub sort_by: IntakeSortField,
    pub sort_order: SortOrder,
}

impl Default for IntakeQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            client_type: None,
            ramis_status: None,
            service: None,
            tax_type: None,
            search: None,
            sort_by: IntakeSortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuditSortField {
    #[default]
    Timestamp,
    Action,
    EntityType,
}

impl AuditSortField {
    /// Unknown names fall back to `timestamp`.
    pub fn parse(name: &str) -> Self {
        match name {
            "action" => Self::Action,
            "entityType" => Self::EntityType,
            _ => Self::Timestamp,
        }
    }
}

/// Filter, sort and page parameters for audit queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    pub page: u64,
    pub limit: u64,
    pub action: Option<AuditAction>,
    pub entity_type: Option<String>,
    pub user_id: Option<Uuid>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub until: Option<DateTime<Utc>>,
    pub sort_by: AuditSortField,
    pub sort_order: SortOrder,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            action: None,
            entity_type: None,
            user_id: None,
            from: None,
            until: None,
            sort_by: AuditSortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

/// Filter and page parameters for staff listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffQuery {
    pub page: u64,
    pub limit: u64,
    pub department_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

impl Default for StaffQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            department_id: None,
            is_active: None,
            search: None,
        }
    }
}

/// Persistence for client intakes and their related parties.
#[async_trait]
pub trait IntakeStore: Send + Sync {
    /// Insert an intake and its parties atomically; returns the stored record.
    async fn create(&self, intake: &NewIntake, created_by: &str) -> Result<ClientIntake>;

    /// Fetch one intake by id, including soft-deleted ones.
    async fn get(&self, id: Uuid) -> Result<Option<ClientIntake>>;

    /// One page of non-deleted intakes matching the query.
    async fn list(&self, query: &IntakeQuery) -> Result<Page<ClientIntake>>;

    /// Every non-deleted intake, oldest first.
    async fn list_all(&self) -> Result<Vec<ClientIntake>>;

    /// Replace scalar fields and the whole party set.
    ///
    /// Fails with `Conflict` when the stored version is no longer
    /// `expected_version`, and `NotFound` when the row is absent or deleted.
    async fn update(
        &self,
        id: Uuid,
        expected_version: i64,
        intake: &NewIntake,
        updated_by: &str,
    ) -> Result<ClientIntake>;

    /// Mark an intake deleted. Same version semantics as [`IntakeStore::update`].
    async fn soft_delete(
        &self,
        id: Uuid,
        expected_version: i64,
        deleted_by: &str,
    ) -> Result<ClientIntake>;

    /// Dashboard counts over non-deleted intakes.
    async fn summary(&self, since: DateTime<Utc>) -> Result<IntakeSummary>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: NewAuditLog) -> Result<AuditLog>;

    async fn query(&self, query: &AuditQuery) -> Result<Page<AuditLogView>>;

    /// Every entry for one entity, oldest first.
    async fn history(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLogView>>;

    async fn count(&self) -> Result<u64>;

    /// Action name -> number of entries.
    async fn action_counts(&self) -> Result<BTreeMap<String, u64>>;

    /// Users with the most entries, busiest first.
    async fn top_users(&self, limit: u64) -> Result<Vec<UserActivity>>;

    /// Newest entries first.
    async fn recent(&self, limit: u64) -> Result<Vec<AuditLogView>>;
}

/// Login accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert, or update the existing user with the same username.
    async fn upsert_user(&self, user: NewUser) -> Result<User>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
}

/// Departments, roles and staff members.
#[async_trait]
pub trait StaffStore: Send + Sync {
    async fn create_department(&self, department: &NewDepartment) -> Result<Department>;

    async fn list_departments(&self, include_inactive: bool) -> Result<Vec<Department>>;

    async fn get_department(&self, id: Uuid) -> Result<Option<Department>>;

    async fn update_department(
        &self,
        id: Uuid,
        update: &UpdateDepartment,
    ) -> Result<Option<Department>>;

    async fn create_role(&self, role: &NewRole) -> Result<Role>;

    async fn list_roles(&self) -> Result<Vec<Role>>;

    async fn get_role(&self, id: Uuid) -> Result<Option<Role>>;

    async fn update_role(&self, id: Uuid, update: &UpdateRole) -> Result<Option<Role>>;

    /// Hard delete. Fails with `Conflict` while any staff member holds the role.
    async fn delete_role(&self, id: Uuid) -> Result<bool>;

    /// Insert a staff member, its role links and optional login account in
    /// one transaction.
    async fn create_staff(&self, staff: &NewStaff, account: Option<NewUser>) -> Result<Staff>;

    async fn get_staff(&self, id: Uuid) -> Result<Option<Staff>>;

    async fn list_staff(&self, query: &StaffQuery) -> Result<Page<Staff>>;

    async fn update_staff(&self, id: Uuid, update: &UpdateStaff) -> Result<Option<Staff>>;

    /// Idempotent.
    async fn assign_role(&self, staff_id: Uuid, role_id: Uuid) -> Result<()>;

    async fn unassign_role(&self, staff_id: Uuid, role_id: Uuid) -> Result<bool>;
}
