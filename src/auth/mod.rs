pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: uuid::Uuid,
    pub email: String,
    pub display_name: String,
    pub role: String,
}

/// Resolves the bearer token to a live user. The users table is consulted on
/// every request, so deactivating a user revokes their outstanding tokens.
#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::auth_required())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::auth_invalid())?;

        let user = state
            .store
            .find_user(claims.sub)?
            .filter(|user| user.is_active)
            .ok_or_else(AppError::auth_invalid)?;

        Ok(AuthenticatedUser {
            user_id: user.id,
            email: user.email,
            display_name: user.display_name,
            role: user.role,
        })
    }
}
