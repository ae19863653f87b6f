//! Login, token verification and account seeding.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::audit::{AuditEvent, AuditRecorder};
use super::{RequestContext, Result, ServiceError};
use crate::auth::{
    hash_password_off_runtime, verify_password_off_runtime, Actor, AuthError, TokenKeys,
};
use crate::config::AuthConfig;
use crate::models::audit::entity;
use crate::models::{AuditAction, NewUser, UserRole, UserSummary};
use crate::storage::UserStore;

/// Username seeded in development when no accounts are configured.
pub const DEV_ADMIN_USERNAME: &str = "admin";
const DEV_ADMIN_PASSWORD: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginResult {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    keys: TokenKeys,
    audit: AuditRecorder,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, keys: TokenKeys, audit: AuditRecorder) -> Self {
        Self { users, keys, audit }
    }

    /// Check credentials and issue a token.
    ///
    /// Unknown users and wrong passwords fail identically, run the same
    /// Argon2 work and leave no audit entry.
    pub async fn login(
        &self,
        ctx: &RequestContext,
        username: &str,
        password: &str,
    ) -> Result<LoginResult> {
        let username = username.trim().to_lowercase();
        let user = self.users.find_user_by_username(&username).await?;
        let stored = user.as_ref().map(|u| u.password_hash.clone());
        let matched = verify_password_off_runtime(password.to_string(), stored).await?;
        let Some(user) = user else {
            warn!(%username, "login failed: unknown user");
            return Err(AuthError::BadCredentials.into());
        };
        if !matched {
            warn!(%username, "login failed: wrong password");
            return Err(AuthError::BadCredentials.into());
        }

        let actor = Actor::from(&user);
        let token = self.keys.issue(&actor)?;
        info!(user_id = %user.id, %username, "user logged in");

        let ctx = RequestContext {
            actor: Some(actor),
            ..ctx.clone()
        };
        self.audit
            .record(
                &ctx,
                AuditEvent::new(AuditAction::Login, entity::USER, user.id)
                    .after(&json!({ "username": user.username })),
            )
            .await;

        Ok(LoginResult {
            token,
            user: user.summary(),
        })
    }

    /// Verify a bearer token.
    pub fn authenticate(&self, token: &str) -> Result<Actor> {
        Ok(self.keys.verify(token)?)
    }

    /// Upsert the configured accounts by username.
    ///
    /// Outside production an empty list seeds `admin`/`admin`.
    pub async fn seed_users(&self, config: &AuthConfig, production: bool) -> Result<usize> {
        let mut accounts: Vec<NewUser> = config
            .users
            .iter()
            .map(|seed| NewUser {
                username: seed.username.trim().to_lowercase(),
                display_name: seed.display_name.clone(),
                role: seed.role,
                password_hash: seed.password_hash.clone(),
                staff_id: None,
            })
            .collect();

        if accounts.is_empty() {
            if production {
                warn!("no users configured; nobody will be able to log in");
                return Ok(0);
            }
            warn!(
                username = DEV_ADMIN_USERNAME,
                "no users configured, seeding development administrator"
            );
            accounts.push(NewUser {
                username: DEV_ADMIN_USERNAME.to_string(),
                display_name: "Administrator".to_string(),
                role: UserRole::Admin,
                password_hash: hash_password_off_runtime(DEV_ADMIN_PASSWORD.to_string()).await?,
                staff_id: None,
            });
        }

        let count = accounts.len();
        for account in accounts {
            if account.username.is_empty() {
                return Err(ServiceError::Internal(
                    "configured user has an empty username".to_string(),
                ));
            }
            let user = self.users.upsert_user(account).await?;
            info!(id = %user.id, username = %user.username, role = %user.role, "user provisioned");
        }
        Ok(count)
    }
}
