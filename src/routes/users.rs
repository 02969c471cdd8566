use axum::{extract::State, http::StatusCode, Json};
use diesel::{prelude::*, result::DatabaseErrorKind};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{password, AdminUser},
    error::{AppError, AppResult},
    mail::templates,
    models::NewUser,
    schema::users,
    state::AppState,
    utils::{
        json::{optional_text, required_text, ApiJson},
        normalize_email,
    },
};

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub company: String,
    pub nip: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserResponse {
    pub message: String,
    pub email: String,
    pub company: String,
    pub welcome_email_sent: bool,
}

#[derive(Serialize, Queryable)]
pub struct UserListEntry {
    pub id: Uuid,
    pub email: String,
    pub company_name: String,
    pub nip: Option<String>,
}

fn validate_email(raw: &str) -> AppResult<String> {
    let email = normalize_email(raw);
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && !domain.is_empty())
        .unwrap_or(false);
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(AppError::bad_request("email must be a valid address"));
    }
    Ok(email)
}

/// Provisions a client account with a generated password and mails the
/// credentials to the new user.
pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<CreateUserResponse>)> {
    let email = validate_email(&payload.email)?;
    let company = required_text(&payload.company, "company")?;
    let nip = optional_text(payload.nip);

    let generated_password = password::generate_password();
    let new_user = NewUser {
        id: Uuid::new_v4(),
        email: email.clone(),
        password_hash: password::hash_password(&generated_password)?,
        company_name: company.clone(),
        tax_id: nip,
        is_admin: false,
    };

    let mut conn = state.db()?;
    match diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            warn!("create user refused: email already registered");
            return Err(AppError::duplicate_email());
        }
        Err(err) => return Err(err.into()),
    }
    drop(conn);

    info!(user_id = %new_user.id, created_by = %admin.user_id, "client account created");

    let welcome = templates::welcome(
        &email,
        &company,
        &generated_password,
        &state.config.public_site_url,
    );
    let welcome_email_sent = match state.mailer.send(welcome).await {
        Ok(()) => true,
        Err(err) => {
            error!(user_id = %new_user.id, error = %err, "failed to send welcome email");
            false
        }
    };

    let message = if welcome_email_sent {
        "Client created, the password was sent by email"
    } else {
        "Client created, but the welcome email could not be sent; ask the client to reset the password"
    };

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            message: message.to_string(),
            email,
            company,
            welcome_email_sent,
        }),
    ))
}

pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<UserListEntry>>> {
    let mut conn = state.db()?;
    let rows: Vec<UserListEntry> = users::table
        .order(users::created_at.desc())
        .select((users::id, users::email, users::company_name, users::tax_id))
        .load(&mut conn)?;

    Ok(Json(rows))
}
