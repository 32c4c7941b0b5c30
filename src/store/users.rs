//! User record persistence contract.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::StoreResult;
use crate::model::{Profile, UserView};

/// Full stored user record, including the password hash.
///
/// Only the credential store sees this type; everything outside it works
/// with [`UserView`].
#[derive(Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub profile: Profile,
    pub token_version: i64,
    pub created_at: OffsetDateTime,
}

impl UserRecord {
    #[must_use]
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            profile: self.profile.clone(),
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("token_version", &self.token_version)
            .finish_non_exhaustive()
    }
}

/// Raw persistence operations; each is a single atomic statement.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new record, failing with `StoreError::Conflict` on a duplicate
    /// username or email.
    async fn insert(&self, record: UserRecord) -> StoreResult<()>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>>;

    /// Apply supplied profile fields; `StoreError::NotFound` if the user is absent.
    async fn update_profile(&self, id: Uuid, patch: Profile) -> StoreResult<()>;

    /// Replace the password hash and bump the token version.
    async fn set_password_hash(&self, id: Uuid, password_hash: String) -> StoreResult<()>;

    /// Returns whether a record was deleted.
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    /// All users ordered by creation time.
    async fn list(&self) -> StoreResult<Vec<UserRecord>>;
}
