//! Access tokens, password hashing and the acting identity.

mod password;
mod token;

pub use password::{
    hash_password, hash_password_off_runtime, verify_password, verify_password_off_runtime,
};
pub use token::{Claims, TokenKeys};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{User, UserRole};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("invalid username or password")]
    BadCredentials,

    #[error("crypto error: {0}")]
    Crypto(String),
}

/// The authenticated user behind a request, as carried in the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: Uuid,
    pub username: String,
    pub role: UserRole,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}
