use axum::{
    Json,
    extract::Extension,
    http::{StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::{
    auth::{
        AuthState,
        session::session_cookie,
        types::{LoginRequest, UserResponse},
    },
    error::ApiError,
};

#[utoipa::path(
    post,
    path= "/auth/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Login successful, session cookie set", body = UserResponse, content_type = "application/json"),
        (status = 401, description = "Invalid username or password"),
    ),
    tag= "auth"
)]
#[instrument(skip(auth_state, payload))]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };

    let Some(account) = auth_state
        .credentials()
        .verify_credentials(&request.username, &request.password)
        .await?
    else {
        return Err(ApiError::InvalidCredentials);
    };

    let token = auth_state.tokens().issue(
        account.user.id,
        &account.user.username,
        account.token_version,
    )?;
    let cookie = session_cookie(auth_state.config(), &token)
        .map_err(|err| ApiError::Internal(err.into()))?;

    if let Err(err) = auth_state
        .ledger()
        .record_login(account.user.id, OffsetDateTime::now_utc())
        .await
    {
        warn!("Failed to record login for {}: {err}", account.user.id);
    }

    info!(user_id = %account.user.id, "user logged in");

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(UserResponse {
            message: "Logged in".to_string(),
            user: account.user,
        }),
    ))
}
