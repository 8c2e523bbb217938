use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

use super::{to_fields, Document, DocumentStore};
use crate::errors::ServiceError;
use crate::models::User;

pub const USERS_COLLECTION: &str = "users";

/// Read access to registered users. Registration itself belongs to the auth
/// service; `save` exists for seeding and the admin CLI.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<User>, ServiceError>;

    async fn list_all(&self) -> Result<Vec<User>, ServiceError>;

    async fn save(&self, user: &User) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct DocumentUserRepository {
    store: Arc<dyn DocumentStore>,
}

impl DocumentUserRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn decode(document: Document) -> Result<User, ServiceError> {
        let id = document.id.clone();
        serde_json::from_value(document.into_record()).map_err(|e| {
            ServiceError::SerializationError(format!("user {} is malformed: {}", id, e))
        })
    }
}

#[async_trait]
impl UserRepository for DocumentUserRepository {
    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<Option<User>, ServiceError> {
        self.store
            .get(USERS_COLLECTION, id)
            .await?
            .map(Self::decode)
            .transpose()
    }

    /// Newest accounts first.
    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<User>, ServiceError> {
        let mut users = self
            .store
            .list(USERS_COLLECTION)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect::<Result<Vec<_>, _>>()?;
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn save(&self, user: &User) -> Result<(), ServiceError> {
        self.store
            .put(USERS_COLLECTION, &user.id, to_fields(user)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::repositories::InMemoryDocumentStore;
    use chrono::{Duration, Utc};

    fn user(id: &str, role: Role, days_ago: i64) -> User {
        User {
            id: id.into(),
            name: format!("User {}", id),
            email: format!("{}@example.com", id),
            role,
            created_at: Utc::now() - Duration::days(days_ago),
        }
    }

    #[tokio::test]
    async fn saved_users_can_be_read_back() {
        let repo = DocumentUserRepository::new(Arc::new(InMemoryDocumentStore::new()));
        let admin = user("admin-1", Role::Admin, 10);
        repo.save(&admin).await.unwrap();
        repo.save(&user("c-1", Role::Customer, 1)).await.unwrap();

        assert_eq!(repo.get("admin-1").await.unwrap(), Some(admin));
        assert!(repo.get("missing").await.unwrap().is_none());

        let ids: Vec<String> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(ids, vec!["c-1".to_string(), "admin-1".to_string()]);
    }

    #[tokio::test]
    async fn save_replaces_existing_user() {
        let repo = DocumentUserRepository::new(Arc::new(InMemoryDocumentStore::new()));
        let mut ada = user("ada", Role::Customer, 0);
        repo.save(&ada).await.unwrap();
        ada.role = Role::Admin;
        repo.save(&ada).await.unwrap();

        assert!(repo.get("ada").await.unwrap().unwrap().is_admin());
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }
}
