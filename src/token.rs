//! Signed, expiring session tokens.
//!
//! Token format: `base64url(claims_json) "." base64url(hmac_sha256(claims_json))`.
//! Tokens are never stored server-side; validity is the signature plus the
//! expiry embedded in the claims. Rotating the secret invalidates every
//! outstanding token.

use anyhow::{Context, Result, anyhow};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Minimum secret length in bytes (256 bits).
pub const MIN_SECRET_LENGTH: usize = 32;

/// Default token lifetime: 7 days.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Claims carried inside a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// User id.
    pub sub: Uuid,
    pub username: String,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expires at, unix seconds.
    pub exp: i64,
    /// Credential generation the token was minted for.
    #[serde(default)]
    pub ver: i64,
}

impl SessionClaims {
    #[must_use]
    pub const fn is_expired_at(&self, now_unix: i64) -> bool {
        now_unix >= self.exp
    }
}

/// Mints and verifies session tokens with a process-wide secret.
#[derive(Clone)]
pub struct TokenService {
    secret: SecretString,
    ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("secret_length", &self.secret.expose_secret().len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenService {
    /// Build a token service from the signing secret.
    ///
    /// # Errors
    /// Returns an error if the secret is shorter than [`MIN_SECRET_LENGTH`] bytes.
    pub fn new(secret: SecretString, ttl: Duration) -> Result<Self> {
        let length = secret.expose_secret().len();
        if length < MIN_SECRET_LENGTH {
            return Err(anyhow!(
                "token secret too short: got {length} bytes, need at least {MIN_SECRET_LENGTH}"
            ));
        }
        Ok(Self { secret, ttl })
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|err| anyhow!("invalid HMAC key: {err}"))
    }

    /// Issue a token for `user_id` that expires after the configured TTL.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue(&self, user_id: Uuid, username: &str, version: i64) -> Result<String> {
        self.issue_at(user_id, username, version, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Issue a token as if the current time were `now_unix`.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue_at(
        &self,
        user_id: Uuid,
        username: &str,
        version: i64,
        now_unix: i64,
    ) -> Result<String> {
        let ttl = i64::try_from(self.ttl.as_secs()).context("token TTL out of range")?;
        let claims = SessionClaims {
            sub: user_id,
            username: username.to_string(),
            iat: now_unix,
            exp: now_unix.saturating_add(ttl),
            ver: version,
        };
        let payload = serde_json::to_vec(&claims).context("failed to encode token claims")?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            Base64UrlUnpadded::encode_string(&payload),
            Base64UrlUnpadded::encode_string(&signature)
        ))
    }

    /// Verify a token against the current time.
    ///
    /// Malformed, tampered and expired tokens all return `None`.
    #[must_use]
    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        self.verify_at(token, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Verify a token as if the current time were `now_unix`.
    #[must_use]
    pub fn verify_at(&self, token: &str, now_unix: i64) -> Option<SessionClaims> {
        let (payload_b64, signature_b64) = token.trim().split_once('.')?;
        let payload = Base64UrlUnpadded::decode_vec(payload_b64).ok()?;
        let signature = Base64UrlUnpadded::decode_vec(signature_b64).ok()?;

        let mut mac = self.mac().ok()?;
        mac.update(&payload);
        // verify_slice compares in constant time
        if mac.verify_slice(&signature).is_err() {
            debug!("session token signature mismatch");
            return None;
        }

        let claims: SessionClaims = serde_json::from_slice(&payload).ok()?;
        if claims.is_expired_at(now_unix) {
            debug!("session token expired");
            return None;
        }
        Some(claims)
    }
}
