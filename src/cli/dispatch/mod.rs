use crate::cli::{
    actions::{Action, server::Args},
    commands::auth,
};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .filter(|dsn| !dsn.trim().is_empty())
        .map(|dsn| SecretString::from(dsn.clone()));

    let token_secret = matches
        .get_one::<String>(auth::ARG_TOKEN_SECRET)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --token-secret")?;

    let prefix = matches
        .get_one::<String>(auth::ARG_PREFIX)
        .cloned()
        .unwrap_or_else(|| "/auth".to_string());
    let session_ttl_seconds = matches
        .get_one::<i64>(auth::ARG_SESSION_TTL_SECONDS)
        .copied()
        .unwrap_or(604_800);
    let cookie_name = matches
        .get_one::<String>(auth::ARG_COOKIE_NAME)
        .cloned()
        .unwrap_or_else(|| "sessa_session".to_string());
    let cookie_secure = matches.get_flag(auth::ARG_COOKIE_SECURE);

    Ok(Action::Server(Args {
        port,
        dsn,
        token_secret,
        prefix,
        session_ttl_seconds,
        cookie_name,
        cookie_secure,
    }))
}
