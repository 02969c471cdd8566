use axum::{extract::State, Json};
use chrono::{Duration as ChronoDuration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    mail::templates,
    models::User,
    schema::users::dsl,
    state::AppState,
    utils::{json::ApiJson, normalize_email},
};

const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account with this email exists, a password reset link has been sent.";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub email: String,
    pub company: String,
    pub is_admin: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub expires_in: i64,
    pub user: UserSummary,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub company: String,
    pub nip: Option<String>,
    pub is_admin: bool,
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let email = normalize_email(&payload.email);
    let mut conn = state.db()?;

    let user: Option<User> = dsl::users
        .filter(dsl::email.eq(&email))
        .first(&mut conn)
        .optional()?;
    drop(conn);

    let Some(user) = user else {
        password::verify_against_dummy(&payload.password);
        warn!("login refused for unknown email");
        return Err(AppError::invalid_credentials());
    };

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::invalid_credentials())?;
    if !valid {
        warn!(user_id = %user.id, "login refused: wrong password");
        return Err(AppError::invalid_credentials());
    }

    let token = state.jwt.generate_token(user.id, &user.email)?;
    info!(user_id = %user.id, is_admin = user.is_admin, "user logged in");

    Ok(Json(LoginResponse {
        message: "Logged in".to_string(),
        token,
        expires_in: state.jwt.expires_in_seconds(),
        user: UserSummary {
            email: user.email,
            company: user.company_name,
            is_admin: user.is_admin,
        },
    }))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let email = normalize_email(&payload.email);
    let mut conn = state.db()?;

    let user_id: Option<Uuid> = dsl::users
        .filter(dsl::email.eq(&email))
        .select(dsl::id)
        .first(&mut conn)
        .optional()?;

    let Some(user_id) = user_id else {
        return Ok(MessageResponse::new(FORGOT_PASSWORD_MESSAGE));
    };

    let raw_token = password::generate_reset_token();
    let expiry = Utc::now()
        + ChronoDuration::minutes(state.config.password_reset_expiry_minutes);

    diesel::update(dsl::users.find(user_id))
        .set((
            dsl::reset_token.eq(Some(password::hash_reset_token(&raw_token))),
            dsl::reset_token_expiry.eq(Some(expiry.timestamp_millis())),
        ))
        .execute(&mut conn)?;
    drop(conn);

    let link = state.config.password_reset_link(&raw_token)?;
    let message = templates::password_reset(
        &email,
        &link,
        state.config.password_reset_expiry_minutes,
    );
    let mailer = state.mailer.clone();
    tokio::spawn(async move {
        if let Err(err) = mailer.send(message).await {
            error!(user_id = %user_id, error = %err, "failed to send password reset email");
        }
    });
    info!(user_id = %user_id, "password reset requested");

    Ok(MessageResponse::new(FORGOT_PASSWORD_MESSAGE))
}

pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let token = payload.token.trim();
    if token.is_empty() {
        return Err(AppError::invalid_or_expired_token());
    }
    if payload.new_password.is_empty() {
        return Err(AppError::bad_request("newPassword is required"));
    }

    let digest = password::hash_reset_token(token);
    let new_hash = password::hash_password(&payload.new_password)?;
    let now_ms = Utc::now().timestamp_millis();
    let mut conn = state.db()?;

    let updated = diesel::update(
        dsl::users
            .filter(dsl::reset_token.eq(&digest))
            .filter(dsl::reset_token_expiry.gt(now_ms)),
    )
    .set((
        dsl::password_hash.eq(&new_hash),
        dsl::reset_token.eq(None::<String>),
        dsl::reset_token_expiry.eq(None::<i64>),
    ))
    .execute(&mut conn)?;

    if updated == 0 {
        // Anything still carrying this digest is expired.
        let cleared = diesel::update(dsl::users.filter(dsl::reset_token.eq(&digest)))
            .set((
                dsl::reset_token.eq(None::<String>),
                dsl::reset_token_expiry.eq(None::<i64>),
            ))
            .execute(&mut conn)?;
        warn!(expired_cleared = cleared, "password reset refused");
        return Err(AppError::invalid_or_expired_token());
    }

    info!("password reset completed");
    Ok(MessageResponse::new("Password has been reset"))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    if payload.old_password.is_empty() || payload.new_password.is_empty() {
        return Err(AppError::bad_request(
            "oldPassword and newPassword are required",
        ));
    }

    let mut conn = state.db()?;
    let current_hash: String = dsl::users
        .find(user.user_id)
        .select(dsl::password_hash)
        .first(&mut conn)?;

    let valid = password::verify_password(&payload.old_password, &current_hash)
        .map_err(|_| AppError::invalid_credentials())?;
    if !valid {
        warn!(user_id = %user.user_id, "password change refused: wrong current password");
        return Err(AppError::invalid_credentials());
    }

    let new_hash = password::hash_password(&payload.new_password)?;
    diesel::update(dsl::users.find(user.user_id))
        .set(dsl::password_hash.eq(&new_hash))
        .execute(&mut conn)?;

    info!(user_id = %user.user_id, "password changed");
    Ok(MessageResponse::new("Password changed"))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<MeResponse>> {
    let mut conn = state.db()?;
    let record: User = dsl::users.find(user.user_id).first(&mut conn)?;

    Ok(Json(MeResponse {
        id: record.id,
        email: record.email,
        company: record.company_name,
        nip: record.tax_id,
        is_admin: record.is_admin,
    }))
}
