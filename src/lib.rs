//! # Sessa (Cookie Session Authentication)
//!
//! `sessa` is a small authentication service plus a matching client. Users
//! register with a username, email and password, log in to receive an
//! `HttpOnly` session cookie, and use that cookie for every protected call.
//!
//! ## Sessions
//!
//! The cookie carries a signed, expiring token (HMAC-SHA256 over JSON claims).
//! Nothing is stored server-side per session: validity is the signature, the
//! expiry and the user's credential generation. Changing a password bumps that
//! generation, which ends every session minted before the change.
//!
//! ## Storage
//!
//! Users and the login history ledger live in `PostgreSQL` when a DSN is given
//! and in memory otherwise. Passwords are hashed with Argon2id.
//!
//! ## Client
//!
//! [`client::SessionCache`] mirrors "who am I" locally, lets callers subscribe
//! to session changes, and drops the cached user as soon as the server answers
//! 401.

pub mod api;
pub mod cli;
pub mod client;
pub mod hasher;
pub mod model;
pub mod store;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
