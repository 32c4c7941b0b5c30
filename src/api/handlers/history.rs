use axum::{Json, extract::Extension};
use std::sync::Arc;

use super::{
    auth::{AuthState, CurrentUser},
    error::ApiError,
};
use crate::model::LoginHistoryEntry;

#[utoipa::path(
    get,
    path = "/auth/login-history",
    responses(
        (status = 200, description = "The caller's login history, newest first.", body = [LoginHistoryEntry]),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "history"
)]
pub async fn own_history(
    auth_state: Extension<Arc<AuthState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<LoginHistoryEntry>>, ApiError> {
    Ok(Json(auth_state.ledger().list_for_user(current.0.id).await?))
}

#[utoipa::path(
    get,
    path = "/auth/login-history/all",
    responses(
        (status = 200, description = "Every login history entry, newest first.", body = [LoginHistoryEntry]),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "history"
)]
pub async fn all_history(
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Json<Vec<LoginHistoryEntry>>, ApiError> {
    Ok(Json(auth_state.ledger().list_all().await?))
}
