//! Login history ledger contract.
//!
//! The ledger is an audit trail only: callers treat every failure as
//! best-effort and never let it block a login or logout.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::StoreResult;
use crate::model::LoginHistoryEntry;

#[async_trait]
pub trait LoginLedger: Send + Sync {
    /// Open a new entry for `user_id` and return its id.
    async fn record_login(&self, user_id: Uuid, at: OffsetDateTime) -> StoreResult<Uuid>;

    /// Close the most recent open entry for `user_id`; no-op when none is open.
    async fn record_logout(&self, user_id: Uuid, at: OffsetDateTime) -> StoreResult<()>;

    /// Entries for one user, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<LoginHistoryEntry>>;

    /// Every entry, newest first.
    async fn list_all(&self) -> StoreResult<Vec<LoginHistoryEntry>>;
}
