//! Audit log domain model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

string_enum! {
    AuditAction {
        Create => "CREATE",
        Update => "UPDATE",
        Delete => "DELETE",
        View => "VIEW",
        Login => "LOGIN",
    }
}

/// Entity type names recorded in `entity_type`.
pub mod entity {
    pub const CLIENT_INTAKE: &str = "ClientIntake";
    pub const STAFF: &str = "Staff";
    pub const DEPARTMENT: &str = "Department";
    pub const ROLE: &str = "Role";
    pub const USER: &str = "User";
}

/// Append-only audit record. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: Uuid,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub user_id: Option<Uuid>,
    pub client_intake_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Input for appending an audit record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditLog {
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub user_id: Option<Uuid>,
    pub client_intake_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Display fields of the acting user, joined onto audit entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
}

/// Reduced client reference, joined onto audit entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIntakeRef {
    pub id: Uuid,
    pub legal_name: String,
    pub email: Option<String>,
}

/// Audit entry as returned by audit queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogView {
    #[serde(flatten)]
    pub log: AuditLog,
    pub user: Option<UserRef>,
    pub client_intake: Option<ClientIntakeRef>,
}

/// Log volume attributed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub user_id: Uuid,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub count: u64,
}

/// Aggregate audit statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total_logs: u64,
    pub action_counts: BTreeMap<String, u64>,
    pub top_users: Vec<UserActivity>,
    pub recent_activity: Vec<AuditLogView>,
}
