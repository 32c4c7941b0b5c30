//! In-memory stores for tests and DSN-less runs.

use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{LoginLedger, StoreError, StoreResult, UserRecord, UserRepository};
use crate::model::{LoginHistoryEntry, Profile};

#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<Uuid, UserRecord>>,
}

impl MemoryUserRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn insert(&self, record: UserRecord) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let taken = users
            .values()
            .any(|user| user.username == record.username || user.email == record.email);
        if taken || users.contains_key(&record.id) {
            return Err(StoreError::Conflict);
        }
        users.insert(record.id, record);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn update_profile(&self, id: Uuid, patch: Profile) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.profile.merge(patch);
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: String) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash;
        user.token_version += 1;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }

    async fn list(&self) -> StoreResult<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.username.cmp(&b.username)));
        Ok(users)
    }
}

#[derive(Debug, Default)]
pub struct MemoryLoginLedger {
    entries: RwLock<Vec<LoginHistoryEntry>>,
}

impl MemoryLoginLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoginLedger for MemoryLoginLedger {
    async fn record_login(&self, user_id: Uuid, at: OffsetDateTime) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        self.entries.write().await.push(LoginHistoryEntry {
            id,
            user_id,
            logged_in_at: at,
            logged_out_at: None,
        });
        Ok(id)
    }

    async fn record_logout(&self, user_id: Uuid, at: OffsetDateTime) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries
            .iter_mut()
            .rev()
            .find(|entry| entry.user_id == user_id && entry.is_open())
        {
            entry.logged_out_at = Some(at);
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<LoginHistoryEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .rev()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> StoreResult<Vec<LoginHistoryEntry>> {
        Ok(self.entries.read().await.iter().rev().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use time::Duration;

    fn record(username: &str, email: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            profile: Profile::default(),
            token_version: 0,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_username_or_email() -> Result<()> {
        let repo = MemoryUserRepository::new();
        repo.insert(record("alice", "a@x.com")).await?;

        let dup_username = repo.insert(record("alice", "other@x.com")).await;
        assert!(matches!(dup_username, Err(StoreError::Conflict)));

        let dup_email = repo.insert(record("bob", "a@x.com")).await;
        assert!(matches!(dup_email, Err(StoreError::Conflict)));

        assert_eq!(repo.list().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn password_change_bumps_token_version() -> Result<()> {
        let repo = MemoryUserRepository::new();
        let user = record("alice", "a@x.com");
        let id = user.id;
        repo.insert(user).await?;
        repo.set_password_hash(id, "new-hash".to_string()).await?;

        let stored = repo.find_by_id(id).await?.context("user exists")?;
        assert_eq!(stored.password_hash, "new-hash");
        assert_eq!(stored.token_version, 1);
        Ok(())
    }

    #[tokio::test]
    async fn update_missing_user_is_not_found() {
        let repo = MemoryUserRepository::new();
        let result = repo.update_profile(Uuid::new_v4(), Profile::default()).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn logout_closes_most_recent_open_entry() -> Result<()> {
        let ledger = MemoryLoginLedger::new();
        let user_id = Uuid::new_v4();
        let start = OffsetDateTime::now_utc();

        let first = ledger.record_login(user_id, start).await?;
        let second = ledger
            .record_login(user_id, start + Duration::seconds(1))
            .await?;
        ledger
            .record_logout(user_id, start + Duration::seconds(2))
            .await?;

        let entries = ledger.list_for_user(user_id).await?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, second);
        assert!(!entries[0].is_open());
        assert_eq!(entries[1].id, first);
        assert!(entries[1].is_open());
        Ok(())
    }

    #[tokio::test]
    async fn logout_without_open_entry_is_noop() -> Result<()> {
        let ledger = MemoryLoginLedger::new();
        let user_id = Uuid::new_v4();
        ledger
            .record_logout(user_id, OffsetDateTime::now_utc())
            .await?;
        assert!(ledger.list_all().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn list_for_user_filters_other_users() -> Result<()> {
        let ledger = MemoryLoginLedger::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        ledger.record_login(alice, now).await?;
        ledger.record_login(bob, now).await?;

        assert_eq!(ledger.list_for_user(alice).await?.len(), 1);
        assert_eq!(ledger.list_all().await?.len(), 2);
        Ok(())
    }
}
