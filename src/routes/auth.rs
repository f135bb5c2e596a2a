use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::UserSummary,
    state::AppState,
};

use super::extract::JsonBody;
use super::{data, Envelope};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserSummary,
}

/// Unknown email, wrong password and deactivated accounts all answer the
/// same 401.
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> AppResult<Json<Envelope<LoginResponse>>> {
    let email = payload.email.trim().to_lowercase();
    let user = state
        .store
        .find_user_by_email(&email)?
        .filter(|user| user.is_active)
        .ok_or_else(AppError::auth_invalid)?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::auth_invalid())?;
    if !valid {
        tracing::info!(user_id = %user.id, "rejected login with wrong password");
        return Err(AppError::auth_invalid());
    }

    let access_token = state
        .jwt
        .generate_token(user.id, &user.email, &user.role)?;

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(data(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.expiry_seconds(),
        user: UserSummary::from(&user),
    }))
}

pub async fn me(user: AuthenticatedUser) -> Json<Envelope<AuthenticatedUser>> {
    data(user)
}
