//! Types shared by the server and the client session cache.
//!
//! `UserView` is the only user shape that ever crosses the wire; the stored
//! password hash and token version stay inside the credential store.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Optional profile fields that can be supplied at registration or patched later.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Profile {
    /// True when no field is set, used to reject empty profile patches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.firstname.is_none()
            && self.lastname.is_none()
            && self.age.is_none()
            && self.phone.is_none()
            && self.address.is_none()
    }

    /// Apply every supplied field of `patch` onto `self`, leaving the rest untouched.
    pub fn merge(&mut self, patch: Profile) {
        if patch.firstname.is_some() {
            self.firstname = patch.firstname;
        }
        if patch.lastname.is_some() {
            self.lastname = patch.lastname;
        }
        if patch.age.is_some() {
            self.age = patch.age;
        }
        if patch.phone.is_some() {
            self.phone = patch.phone;
        }
        if patch.address.is_some() {
            self.address = patch.address;
        }
    }
}

/// Public projection of a user record.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
}

/// One login/logout pair from the login history ledger.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginHistoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub logged_in_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub logged_out_at: Option<OffsetDateTime>,
}

impl LoginHistoryEntry {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.logged_out_at.is_none()
    }
}
