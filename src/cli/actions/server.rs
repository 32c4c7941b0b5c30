use crate::{
    api::{self, handlers::auth::AuthConfig},
    token::TokenService,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<SecretString>,
    pub token_secret: SecretString,
    pub prefix: String,
    pub session_ttl_seconds: i64,
    pub cookie_name: String,
    pub cookie_secure: bool,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::new()
            .with_prefix(&self.prefix)
            .with_cookie_name(self.cookie_name.clone())
            .with_cookie_secure(self.cookie_secure)
            .with_session_ttl_seconds(self.session_ttl_seconds)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the token secret is rejected or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let ttl = u64::try_from(args.session_ttl_seconds).context("session TTL must be positive")?;
    let tokens = TokenService::new(args.token_secret.clone(), Duration::from_secs(ttl))
        .context("Invalid token secret")?;

    api::new(args.port, args.dsn.clone(), args.auth_config(), tokens).await
}

fn log_startup_args(args: &Args) {
    info!(
        port = args.port,
        storage = if args.dsn.is_some() { "postgres" } else { "memory" },
        prefix = %args.prefix,
        cookie_name = %args.cookie_name,
        cookie_secure = args.cookie_secure,
        session_ttl_seconds = args.session_ttl_seconds,
        "Starting sessa"
    );
}
