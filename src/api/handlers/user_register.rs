use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{
    auth::{
        AuthState,
        types::{RegisterRequest, RegisterResponse},
    },
    check_password,
    error::ApiError,
    valid_email, valid_username,
};
use crate::store::NewUser;

#[utoipa::path(
    post,
    path= "/auth/register",
    request_body = RegisterRequest,
    responses (
        (status = 201, description = "Registration successful", body = RegisterResponse, content_type = "application/json"),
        (status = 400, description = "Missing or invalid fields"),
        (status = 409, description = "User with the specified username or email already exists"),
    ),
    tag= "auth"
)]
#[instrument(skip(auth_state, payload))]
pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };

    if !valid_username(&request.username) {
        return Err(ApiError::Validation(
            "Username must be 3-32 characters of letters, digits, '.', '_' or '-'".to_string(),
        ));
    }
    if !valid_email(&request.email) {
        return Err(ApiError::Validation("Invalid email".to_string()));
    }
    check_password(&request.password)?;

    let user_id = auth_state
        .credentials()
        .create_user(NewUser {
            username: request.username,
            password: request.password,
            email: request.email,
            profile: request.profile,
        })
        .await?;

    debug!("registered user {user_id}");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered".to_string(),
            user_id,
        }),
    ))
}
