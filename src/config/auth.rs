//! Authentication configuration.

use serde::Deserialize;

use crate::models::UserRole;

/// Token signing secret used in development when none is configured.
pub const DEV_JWT_SECRET: &str = "dev-jwt-secret";
/// Delete passcode used in development when none is configured.
pub const DEV_DELETE_PASSCODE: &str = "dev-delete-passcode";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret. Required in production.
    pub jwt_secret: Option<String>,
    /// Token lifetime.
    pub token_ttl_secs: u64,
    /// `iss` claim written and required on tokens.
    pub issuer: String,
    /// Shared passcode gating soft deletes. Required in production.
    pub delete_passcode: Option<String>,
    /// Accounts upserted at startup.
    pub users: Vec<SeedUser>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_secs: 8 * 60 * 60,
            issuer: "clientdesk".to_string(),
            delete_passcode: None,
            users: Vec::new(),
        }
    }
}

impl AuthConfig {
    pub fn jwt_secret(&self) -> &str {
        self.jwt_secret.as_deref().unwrap_or(DEV_JWT_SECRET)
    }

    pub fn delete_passcode(&self) -> &str {
        self.delete_passcode.as_deref().unwrap_or(DEV_DELETE_PASSCODE)
    }
}

/// An account provisioned from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub username: String,
    /// Argon2 PHC string; plaintext passwords are never configured.
    pub password_hash: String,
    pub display_name: String,
    #[serde(default = "default_seed_role")]
    pub role: UserRole,
}

fn default_seed_role() -> UserRole {
    UserRole::Staff
}
