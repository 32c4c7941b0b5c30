//! Session guard for protected routes.
//!
//! Flow Overview: read the session cookie, verify the token, resolve the user
//! and check the token still matches the user's credential generation. On
//! success the resolved [`CurrentUser`] is placed in the request extensions;
//! on any failure the request is rejected with 401 and the cookie is cleared.

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use super::{
    session::{clear_cookie_headers, extract_session_token},
    state::AuthState,
};
use crate::{api::handlers::error::ApiError, model::UserView};

/// Authenticated user injected by [`require_session`].
#[derive(Clone, Debug)]
pub struct CurrentUser(pub UserView);

/// Middleware run in front of every protected route.
pub async fn require_session(
    auth_state: Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let config = auth_state.config();
    let Some(token) = extract_session_token(request.headers(), config) else {
        return ApiError::Unauthenticated.into_response();
    };

    let Some(claims) = auth_state.tokens().verify(&token) else {
        debug!("Rejected invalid session token");
        return reject_and_clear(&auth_state);
    };

    let account = match auth_state.credentials().get_by_id(claims.sub).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            debug!("Session token refers to missing user {}", claims.sub);
            return reject_and_clear(&auth_state);
        }
        Err(err) => return ApiError::from(err).into_response(),
    };

    if account.token_version != claims.ver {
        debug!("Session token for {} predates a password change", claims.sub);
        return reject_and_clear(&auth_state);
    }

    request.extensions_mut().insert(CurrentUser(account.user));
    next.run(request).await
}

fn reject_and_clear(auth_state: &AuthState) -> Response {
    (
        clear_cookie_headers(auth_state.config()),
        ApiError::Unauthenticated,
    )
        .into_response()
}
