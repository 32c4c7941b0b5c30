//! Credential store: user persistence plus password hashing.
//!
//! Flow Overview:
//! 1) Callers hand over plaintext passwords; hashing happens here on the
//!    blocking pool so Argon2 never stalls the async executor.
//! 2) Lookups return [`Account`], which carries the public view and the token
//!    version but never the hash.
//! 3) Unknown usernames still pay for one Argon2 verification so both
//!    credential failure paths take comparable time.

use anyhow::Context;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{StoreError, StoreResult, UserRecord, UserRepository};
use crate::{
    hasher::PasswordHasher,
    model::{Profile, UserView},
};

/// Input for [`CredentialStore::create_user`].
#[derive(Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: String,
    pub profile: Profile,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// A resolved user together with the credential generation tokens are bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub user: UserView,
    pub token_version: i64,
}

impl From<&UserRecord> for Account {
    fn from(record: &UserRecord) -> Self {
        Self {
            user: record.view(),
            token_version: record.token_version,
        }
    }
}

/// Lowercased, trimmed email used for storage and uniqueness.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct CredentialStore {
    users: Arc<dyn UserRepository>,
    hasher: PasswordHasher,
    dummy_hash: OnceCell<String>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    #[must_use]
    pub fn new(users: Arc<dyn UserRepository>, hasher: PasswordHasher) -> Self {
        Self {
            users,
            hasher,
            dummy_hash: OnceCell::new(),
        }
    }

    async fn hash_password(&self, password: &str) -> StoreResult<String> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("password hashing task failed")??;
        Ok(hash)
    }

    async fn verify_password(&self, password: &str, hash: String) -> StoreResult<bool> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .context("password verification task failed")?;
        Ok(matches)
    }

    async fn dummy_hash(&self) -> StoreResult<String> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| async {
                let random = Uuid::new_v4().to_string();
                self.hash_password(&random).await
            })
            .await?;
        Ok(hash.clone())
    }

    /// Create a user and return its id.
    ///
    /// # Errors
    /// `StoreError::Conflict` if the username or email is taken.
    #[instrument(skip(self))]
    pub async fn create_user(&self, new_user: NewUser) -> StoreResult<Uuid> {
        let password_hash = self.hash_password(&new_user.password).await?;
        let record = UserRecord {
            id: Uuid::new_v4(),
            username: new_user.username.trim().to_string(),
            email: normalize_email(&new_user.email),
            password_hash,
            profile: new_user.profile,
            token_version: 0,
            created_at: OffsetDateTime::now_utc(),
        };
        let id = record.id;
        self.users.insert(record).await?;
        debug!(user_id = %id, "user created");
        Ok(id)
    }

    /// Check a username/password pair.
    ///
    /// Returns `Ok(None)` for both unknown users and wrong passwords.
    ///
    /// # Errors
    /// Only backend failures are errors.
    #[instrument(skip(self, password))]
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> StoreResult<Option<Account>> {
        let Some(record) = self.users.find_by_username(username.trim()).await? else {
            let dummy = self.dummy_hash().await?;
            let _ = self.verify_password(password, dummy).await?;
            return Ok(None);
        };

        if self
            .verify_password(password, record.password_hash.clone())
            .await?
        {
            Ok(Some(Account::from(&record)))
        } else {
            Ok(None)
        }
    }

    /// Apply the supplied profile fields.
    ///
    /// # Errors
    /// `StoreError::NotFound` if the user does not exist.
    #[instrument(skip(self))]
    pub async fn update_profile(&self, user_id: Uuid, patch: Profile) -> StoreResult<()> {
        self.users.update_profile(user_id, patch).await
    }

    /// Replace the password hash. Outstanding tokens are invalidated through
    /// the token version bump, but clearing the caller's cookie is up to the
    /// endpoint.
    ///
    /// # Errors
    /// `StoreError::NotFound` if the user does not exist.
    #[instrument(skip(self, new_password))]
    pub async fn change_password(&self, user_id: Uuid, new_password: &str) -> StoreResult<()> {
        let password_hash = self.hash_password(new_password).await?;
        self.users.set_password_hash(user_id, password_hash).await
    }

    /// # Errors
    /// Only backend failures are errors.
    pub async fn get_by_id(&self, user_id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self
            .users
            .find_by_id(user_id)
            .await?
            .as_ref()
            .map(Account::from))
    }

    /// # Errors
    /// Only backend failures are errors.
    pub async fn list_all(&self) -> StoreResult<Vec<UserView>> {
        Ok(self.users.list().await?.iter().map(UserRecord::view).collect())
    }

    /// # Errors
    /// `StoreError::NotFound` if the user does not exist.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: Uuid) -> StoreResult<()> {
        if self.users.delete(user_id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }
}
