//! PostgreSQL implementations of the user repository and login ledger.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use time::OffsetDateTime;
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::{LoginLedger, StoreError, StoreResult, UserRecord, UserRepository};
use crate::model::{LoginHistoryEntry, Profile};

/// Schema applied at startup; every statement is idempotent.
pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const USER_COLUMNS: &str = "id, username, email, password_hash, firstname, lastname, age, \
                            phone, address, token_version, created_at";

/// Apply [`SCHEMA_SQL`] to the database.
///
/// # Errors
/// Returns an error if any schema statement fails.
pub async fn apply_schema(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .instrument(info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SCHEMA"
        ))
        .await
        .context("failed to apply database schema")?;
    Ok(())
}

fn query_span(operation: &'static str, statement: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        profile: Profile {
            firstname: row.get("firstname"),
            lastname: row.get("lastname"),
            age: row.get("age"),
            phone: row.get("phone"),
            address: row.get("address"),
        },
        token_version: row.get("token_version"),
        created_at: row.get("created_at"),
    }
}

fn entry_from_row(row: &PgRow) -> LoginHistoryEntry {
    LoginHistoryEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        logged_in_at: row.get("logged_in_at"),
        logged_out_at: row.get("logged_out_at"),
    }
}

#[derive(Clone, Debug)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert(&self, record: UserRecord) -> StoreResult<()> {
        let query = r"
            INSERT INTO users
                (id, username, email, password_hash, firstname, lastname, age, phone, address,
                 token_version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ";
        let result = sqlx::query(query)
            .bind(record.id)
            .bind(&record.username)
            .bind(&record.email)
            .bind(&record.password_hash)
            .bind(&record.profile.firstname)
            .bind(&record.profile.lastname)
            .bind(record.profile.age)
            .bind(&record.profile.phone)
            .bind(&record.profile.address)
            .bind(record.token_version)
            .bind(record.created_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict),
            Err(err) => Err(StoreError::Backend(
                anyhow::Error::new(err).context("failed to insert user"),
            )),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user by id")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user by username")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn update_profile(&self, id: Uuid, patch: Profile) -> StoreResult<()> {
        let query = r"
            UPDATE users SET
                firstname = COALESCE($2, firstname),
                lastname = COALESCE($3, lastname),
                age = COALESCE($4, age),
                phone = COALESCE($5, phone),
                address = COALESCE($6, address)
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(patch.firstname)
            .bind(patch.lastname)
            .bind(patch.age)
            .bind(patch.phone)
            .bind(patch.address)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update profile")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: String) -> StoreResult<()> {
        let query = r"
            UPDATE users
            SET password_hash = $2, token_version = token_version + 1
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update password hash")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let query = "DELETE FROM users WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> StoreResult<Vec<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at, username");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to list users")?;
        Ok(rows.iter().map(user_from_row).collect())
    }
}

#[derive(Clone, Debug)]
pub struct PgLoginLedger {
    pool: PgPool,
}

impl PgLoginLedger {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginLedger for PgLoginLedger {
    async fn record_login(&self, user_id: Uuid, at: OffsetDateTime) -> StoreResult<Uuid> {
        let query = r"
            INSERT INTO login_history (id, user_id, logged_in_at)
            VALUES ($1, $2, $3)
        ";
        let id = Uuid::new_v4();
        sqlx::query(query)
            .bind(id)
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to record login")?;
        Ok(id)
    }

    async fn record_logout(&self, user_id: Uuid, at: OffsetDateTime) -> StoreResult<()> {
        let query = r"
            UPDATE login_history
            SET logged_out_at = $2
            WHERE id = (
                SELECT id FROM login_history
                WHERE user_id = $1 AND logged_out_at IS NULL
                ORDER BY logged_in_at DESC
                LIMIT 1
            )
        ";
        sqlx::query(query)
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to record logout")?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<LoginHistoryEntry>> {
        let query = r"
            SELECT id, user_id, logged_in_at, logged_out_at
            FROM login_history
            WHERE user_id = $1
            ORDER BY logged_in_at DESC
        ";
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list login history")?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn list_all(&self) -> StoreResult<Vec<LoginHistoryEntry>> {
        let query = r"
            SELECT id, user_id, logged_in_at, logged_out_at
            FROM login_history
            ORDER BY logged_in_at DESC
        ";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list login history")?;
        Ok(rows.iter().map(entry_from_row).collect())
    }
}
