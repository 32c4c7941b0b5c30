//! Authenticated self-service endpoints.
//!
//! Flow Overview:
//! 1) The session guard resolves the caller into [`CurrentUser`].
//! 2) Reads return the caller's public view.
//! 3) Profile patches apply only supplied fields; a password change bumps the
//!    credential generation, which invalidates every outstanding token.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::{
    auth::{
        AuthState, CurrentUser,
        session::clear_cookie_headers,
        types::{ChangePasswordRequest, MessageResponse, UserResponse},
    },
    check_password,
    error::ApiError,
};
use crate::model::{Profile, UserView};

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Return the authenticated user profile.", body = UserView),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "me"
)]
pub async fn get_me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<UserView> {
    Json(user)
}

#[utoipa::path(
    patch,
    path = "/auth/me",
    request_body = Profile,
    responses(
        (status = 200, description = "Profile updated.", body = UserResponse),
        (status = 400, description = "No fields to update."),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "me"
)]
#[instrument(skip_all)]
pub async fn patch_me(
    auth_state: Extension<Arc<AuthState>>,
    Extension(current): Extension<CurrentUser>,
    payload: Option<Json<Profile>>,
) -> Result<Json<UserResponse>, ApiError> {
    let patch = payload.map(|Json(patch)| patch).unwrap_or_default();
    if patch.is_empty() {
        return Err(ApiError::NoFields);
    }

    let credentials = auth_state.credentials();
    credentials.update_profile(current.0.id, patch).await?;
    let account = credentials
        .get_by_id(current.0.id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(UserResponse {
        message: "Profile updated".to_string(),
        user: account.user,
    }))
}

#[utoipa::path(
    patch,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed, session cookie cleared.", body = MessageResponse),
        (status = 400, description = "New password does not meet requirements."),
        (status = 401, description = "Current password is wrong or session is invalid."),
    ),
    tag = "me"
)]
#[instrument(skip_all)]
pub async fn change_password(
    auth_state: Extension<Arc<AuthState>>,
    Extension(current): Extension<CurrentUser>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };
    check_password(&request.new_password)?;

    let credentials = auth_state.credentials();
    let verified = credentials
        .verify_credentials(&current.0.username, &request.current_password)
        .await?;
    if !matches!(verified, Some(account) if account.user.id == current.0.id) {
        return Err(ApiError::InvalidCredentials);
    }

    credentials
        .change_password(current.0.id, &request.new_password)
        .await?;

    if let Err(err) = auth_state
        .ledger()
        .record_logout(current.0.id, OffsetDateTime::now_utc())
        .await
    {
        warn!("Failed to record logout for {}: {err}", current.0.id);
    }

    info!("password changed");

    Ok((
        StatusCode::OK,
        clear_cookie_headers(auth_state.config()),
        Json(MessageResponse::new("Password changed, please log in again")),
    ))
}
