pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    schema::users,
    state::AppState,
};

/// Caller identity resolved from the bearer token alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
}

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
                .map_err(|_| AppError::unauthenticated())?;

        let claims = state.jwt.verify_token(bearer.token()).map_err(|err| {
            warn!(error = %err, "rejected bearer token");
            AppError::forbidden()
        })?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}

/// Caller whose `is_admin` flag was read from the database for this request.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !is_admin(state, user.user_id)? {
            warn!(user_id = %user.user_id, "admin route refused for non-admin");
            return Err(AppError::forbidden());
        }
        Ok(AdminUser(user))
    }
}

/// Fresh role lookup. A user row that no longer exists is treated as non-admin.
pub fn is_admin(state: &AppState, user_id: Uuid) -> AppResult<bool> {
    let mut conn = state.db()?;
    let flag: Option<bool> = users::table
        .find(user_id)
        .select(users::is_admin)
        .first(&mut conn)
        .optional()?;
    Ok(flag.unwrap_or(false))
}
