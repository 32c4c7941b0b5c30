//! User directory endpoints.

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    auth::{AuthState, CurrentUser, session::clear_cookie_headers, types::MessageResponse},
    error::ApiError,
};
use crate::model::UserView;

#[utoipa::path(
    get,
    path = "/auth/users",
    responses(
        (status = 200, description = "All registered users.", body = [UserView]),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "users"
)]
pub async fn list_users(
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    Ok(Json(auth_state.credentials().list_all().await?))
}

#[utoipa::path(
    delete,
    path = "/auth/user/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted.", body = MessageResponse),
        (status = 400, description = "Malformed user id."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Users can only delete themselves."),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn delete_user(
    auth_state: Extension<Arc<AuthState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let target = Uuid::parse_str(id.trim())
        .map_err(|_| ApiError::Validation("Invalid user id".to_string()))?;

    if target != current.0.id {
        return Err(ApiError::Forbidden);
    }

    auth_state.credentials().delete_user(target).await?;
    info!(user_id = %target, "user deleted");

    // Only self-deletion is allowed, so the session always ends here.
    Ok((
        StatusCode::OK,
        clear_cookie_headers(auth_state.config()),
        Json(MessageResponse::new("User deleted")),
    ))
}
