use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::auth::MessageResponse;
use crate::{
    auth::{AdminUser, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{NewService, Service, ServiceStatus},
    schema::{services, users},
    state::AppState,
    utils::{
        json::{optional_text, required_text, ApiJson},
        to_iso,
    },
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddServiceRequest {
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateServiceRequest {
    pub status: Option<String>,
    pub description: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = services)]
struct ServiceChanges {
    status: Option<String>,
    description: Option<String>,
}

#[derive(Serialize)]
pub struct ServiceResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub status: String,
    pub created_at: String,
}

impl From<Service> for ServiceResponse {
    fn from(service: Service) -> Self {
        Self {
            id: service.id,
            name: service.name,
            description: service.description,
            status: service.status,
            created_at: to_iso(service.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct AdminServiceResponse {
    #[serde(flatten)]
    pub service: ServiceResponse,
    pub company_name: String,
    pub email: String,
}

#[derive(Serialize)]
pub struct ToggleServiceResponse {
    pub message: String,
    pub status: ServiceStatus,
}

pub async fn list_my_services(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ServiceResponse>>> {
    let mut conn = state.db()?;
    let rows: Vec<Service> = services::table
        .filter(services::owner_user_id.eq(user.user_id))
        .order(services::created_at.desc())
        .select(Service::as_select())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(ServiceResponse::from).collect()))
}

pub async fn list_all_services(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<AdminServiceResponse>>> {
    let mut conn = state.db()?;
    let rows: Vec<(Service, String, String)> = services::table
        .inner_join(users::table)
        .order(services::created_at.desc())
        .select((Service::as_select(), users::company_name, users::email))
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|(service, company_name, email)| AdminServiceResponse {
                service: service.into(),
                company_name,
                email,
            })
            .collect(),
    ))
}

pub async fn add_service(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(payload): ApiJson<AddServiceRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let name = required_text(&payload.name, "name")?;
    let description = optional_text(payload.description).unwrap_or_default();
    let mut conn = state.db()?;

    let owner_id: Uuid = users::table
        .find(payload.user_id)
        .select(users::id)
        .first(&mut conn)?;

    let new_service = NewService {
        id: Uuid::new_v4(),
        owner_user_id: owner_id,
        name,
        description,
        status: ServiceStatus::Active.as_str().to_string(),
    };
    diesel::insert_into(services::table)
        .values(&new_service)
        .execute(&mut conn)?;

    info!(
        service_id = %new_service.id,
        owner_id = %owner_id,
        created_by = %admin.user_id,
        "service added"
    );
    Ok((StatusCode::CREATED, MessageResponse::new("Service added")))
}

pub async fn update_service(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(service_id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateServiceRequest>,
) -> AppResult<Json<MessageResponse>> {
    let status = payload
        .status
        .as_deref()
        .map(|value| value.parse::<ServiceStatus>().map_err(AppError::bad_request))
        .transpose()?;

    if status.is_none() && payload.description.is_none() {
        return Err(AppError::bad_request(
            "provide status and/or description to update",
        ));
    }

    let changes = ServiceChanges {
        status: status.map(|status| status.as_str().to_string()),
        description: payload.description.map(|value| value.trim().to_string()),
    };

    let mut conn = state.db()?;
    let updated = diesel::update(services::table.find(service_id))
        .set(&changes)
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(AppError::not_found());
    }

    info!(service_id = %service_id, "service updated");
    Ok(MessageResponse::new("Service updated"))
}

pub async fn toggle_service(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(service_id): Path<Uuid>,
) -> AppResult<Json<ToggleServiceResponse>> {
    let mut conn = state.db()?;

    let next = conn.transaction::<ServiceStatus, AppError, _>(|conn| {
        let current: String = services::table
            .find(service_id)
            .select(services::status)
            .for_update()
            .first(conn)?;
        let next = current
            .parse::<ServiceStatus>()
            .map_err(AppError::internal)?
            .toggled();

        diesel::update(services::table.find(service_id))
            .set(services::status.eq(next.as_str()))
            .execute(conn)?;
        Ok(next)
    })?;

    info!(service_id = %service_id, status = next.as_str(), "service status toggled");
    Ok(Json(ToggleServiceResponse {
        message: "Service status changed".to_string(),
        status: next,
    }))
}

pub async fn delete_service(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(service_id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    let mut conn = state.db()?;
    let deleted = diesel::delete(services::table.find(service_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }

    info!(service_id = %service_id, "service deleted");
    Ok(MessageResponse::new("Service deleted"))
}
