//! Auth state and configuration shared by every handler.

use std::sync::Arc;

use crate::{
    store::{CredentialStore, LoginLedger},
    token::TokenService,
};

const DEFAULT_PREFIX: &str = "/auth";
const DEFAULT_COOKIE_NAME: &str = "sessa_session";
const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    prefix: String,
    cookie_name: String,
    cookie_secure: bool,
    session_ttl_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_secure: false,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    /// Route prefix; normalized to a leading slash and no trailing slash.
    /// An empty prefix mounts the routes at the root.
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = normalize_prefix(prefix);
        self
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: String) -> Self {
        self.cookie_name = name;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Everything the auth endpoints need, injected once at startup.
pub struct AuthState {
    config: AuthConfig,
    tokens: TokenService,
    credentials: CredentialStore,
    ledger: Arc<dyn LoginLedger>,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        tokens: TokenService,
        credentials: CredentialStore,
        ledger: Arc<dyn LoginLedger>,
    ) -> Self {
        Self {
            config,
            tokens,
            credentials,
            ledger,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    #[must_use]
    pub fn ledger(&self) -> &dyn LoginLedger {
        self.ledger.as_ref()
    }
}
