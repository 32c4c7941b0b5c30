//! Persistence for user records and the login history ledger.
//!
//! Both concerns sit behind traits so the endpoints receive them injected
//! through [`crate::api::handlers::auth::AuthState`]. Each backend offers a
//! PostgreSQL implementation (`sqlx`) and an in-memory one used by tests and
//! by the server when no DSN is configured.

pub mod credentials;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod users;

pub use credentials::{Account, CredentialStore, NewUser};
pub use ledger::LoginLedger;
pub use users::{UserRecord, UserRepository};

use thiserror::Error;

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username or email already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
