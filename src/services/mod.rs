//! Business operations over the injected stores.
//!
//! Services own the authorization checks, validation, audit side effects
//! and the mapping from storage failures to [`ServiceError`]. The REST
//! layer only translates HTTP to and from these calls.

pub mod audit;
pub mod auth;
pub mod intake;
pub mod staff;

pub use audit::{AuditEvent, AuditRecorder, AuditService};
pub use auth::{AuthService, LoginResult};
pub use intake::IntakeService;
pub use staff::StaffService;

use crate::auth::{Actor, AuthError};
use crate::storage::StoreError;
use crate::validation::ValidationErrors;

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Who is calling and from where.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: Option<Actor>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_actor(actor: Actor) -> Self {
        Self {
            actor: Some(actor),
            ..Self::default()
        }
    }

    /// The authenticated actor, or `Unauthorized`.
    pub fn require_actor(&self) -> Result<&Actor> {
        self.actor
            .as_ref()
            .ok_or_else(|| ServiceError::Unauthorized(AuthError::MissingToken.to_string()))
    }

    /// The authenticated actor if it holds the ADMIN role.
    pub fn require_admin(&self) -> Result<&Actor> {
        let actor = self.require_actor()?;
        if !actor.is_admin() {
            return Err(ServiceError::Forbidden(
                "administrator role required".to_string(),
            ));
        }
        Ok(actor)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => ServiceError::NotFound(e.to_string()),
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Unavailable(msg) => ServiceError::Unavailable(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Crypto(msg) => ServiceError::Internal(msg),
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}
