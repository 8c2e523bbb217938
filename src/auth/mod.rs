/*!
 * # Identity and role checks
 *
 * Sign-in and registration live in an external auth service. The core only
 * asks it who is signed in, and decides admin access from the user's role.
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::errors::ServiceError;
use crate::models::User;

/// The signed-in shopper as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
        }
    }
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self::new(user.id.clone(), user.email.clone())
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `None` when nobody is signed in.
    async fn current_identity(&self) -> Option<Identity>;
}

/// Session holder for a single process (CLI, tests).
#[derive(Debug, Default)]
pub struct StaticAuthProvider {
    identity: RwLock<Option<Identity>>,
}

impl StaticAuthProvider {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(identity: Identity) -> Self {
        Self {
            identity: RwLock::new(Some(identity)),
        }
    }

    pub async fn sign_in(&self, identity: Identity) {
        *self.identity.write().await = Some(identity);
    }

    pub async fn sign_out(&self) {
        *self.identity.write().await = None;
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn current_identity(&self) -> Option<Identity> {
        self.identity.read().await.clone()
    }
}

/// Admin-only operations call this with the acting user.
pub fn require_admin(user: &User) -> Result<(), ServiceError> {
    if user.is_admin() {
        Ok(())
    } else {
        warn!(user_id = %user.id, "Rejected admin operation for non-admin user");
        Err(ServiceError::Forbidden(format!(
            "user {} does not have the admin role",
            user.id
        )))
    }
}
