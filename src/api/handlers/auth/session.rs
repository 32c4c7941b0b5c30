//! Session cookie handling and the logout endpoint.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

use super::{
    state::{AuthConfig, AuthState},
    types::MessageResponse,
};

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session cleared", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Tokens are stateless; a valid one only tells us whose ledger entry to close.
    if let Some(claims) = extract_session_token(&headers, auth_state.config())
        .and_then(|token| auth_state.tokens().verify(&token))
    {
        // A token from an older credential generation no longer owns the open entry.
        let current = match auth_state.credentials().get_by_id(claims.sub).await {
            Ok(Some(account)) => account.token_version == claims.ver,
            Ok(None) => false,
            Err(err) => {
                warn!("Failed to resolve user {} on logout: {err}", claims.sub);
                false
            }
        };
        if !current {
            debug!("Skipping ledger update for stale session of {}", claims.sub);
        } else if let Err(err) = auth_state
            .ledger()
            .record_logout(claims.sub, OffsetDateTime::now_utc())
            .await
        {
            warn!("Failed to record logout for {}: {err}", claims.sub);
        }
    }

    // Always clear the cookie, even if there was no session.
    (
        StatusCode::OK,
        clear_cookie_headers(auth_state.config()),
        Json(MessageResponse::new("Logged out")),
    )
        .into_response()
}

/// Build an `HttpOnly` cookie carrying the session token.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.cookie_name(),
        config.session_ttl_seconds()
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        config.cookie_name()
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Headers that expire the session cookie; empty if the cookie name is not a
/// valid header value.
pub(crate) fn clear_cookie_headers(config: &AuthConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match clear_session_cookie(config) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build clearing cookie: {err}"),
    }
    headers
}

pub(crate) fn extract_session_token(headers: &HeaderMap, config: &AuthConfig) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else {
                continue;
            };
            if key.trim() == config.cookie_name() {
                let val = val.trim();
                if val.is_empty() {
                    return None;
                }
                return Some(val.to_string());
            }
        }
    }
    None
}
