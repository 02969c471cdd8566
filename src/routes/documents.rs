use std::str::FromStr;

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::auth::MessageResponse;
use crate::{
    auth::{is_admin, AdminUser, AuthenticatedUser},
    error::{AppError, AppResult},
    mail::templates,
    models::{Document, DocumentKind, NewDocument, User},
    schema::{documents, users},
    state::AppState,
    storage::generate_stored_filename,
    utils::to_iso,
};

const DEFAULT_ORIGINAL_NAME: &str = "document.pdf";

fn attachment_content_disposition(title: &str) -> String {
    let filename = format!("{}.pdf", title.trim());
    let ascii: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_ascii_graphic() || ch == ' ' => ch,
            _ => '_',
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&filename, percent_encoding::NON_ALPHANUMERIC);
    format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}

#[derive(Deserialize)]
pub struct DocumentListQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDocumentListQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct AdminDocumentResponse {
    pub id: Uuid,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub created_at: String,
}

fn parse_kind_filter(raw: Option<&str>) -> AppResult<Option<DocumentKind>> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => DocumentKind::from_str(value)
            .map(Some)
            .map_err(AppError::bad_request),
    }
}

pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<DocumentListQuery>,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let kind = parse_kind_filter(query.kind.as_deref())?;
    let mut conn = state.db()?;

    let mut statement = documents::table
        .filter(documents::owner_user_id.eq(user.user_id))
        .into_boxed();
    if let Some(kind) = kind {
        statement = statement.filter(documents::kind.eq(kind.as_str()));
    }

    let rows: Vec<Document> = statement
        .order(documents::created_at.desc())
        .select(Document::as_select())
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|doc| DocumentResponse {
                id: doc.id,
                kind: doc.kind,
                title: doc.title,
                created_at: to_iso(doc.created_at),
            })
            .collect(),
    ))
}

pub async fn list_all_documents(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<AdminDocumentListQuery>,
) -> AppResult<Json<Vec<AdminDocumentResponse>>> {
    let mut conn = state.db()?;

    let mut statement = documents::table.into_boxed();
    if let Some(user_id) = query.user_id {
        statement = statement.filter(documents::owner_user_id.eq(user_id));
    }

    let rows: Vec<Document> = statement
        .order(documents::created_at.desc())
        .select(Document::as_select())
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|doc| AdminDocumentResponse {
                id: doc.id,
                user_id: doc.owner_user_id,
                kind: doc.kind,
                title: doc.title,
                created_at: to_iso(doc.created_at),
            })
            .collect(),
    ))
}

pub async fn download_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<Response> {
    let mut conn = state.db()?;
    let doc: Document = documents::table
        .find(document_id)
        .select(Document::as_select())
        .first(&mut conn)?;
    drop(conn);

    if doc.owner_user_id != user.user_id && !is_admin(&state, user.user_id)? {
        warn!(
            document_id = %doc.id,
            user_id = %user.user_id,
            "download refused: document belongs to another user"
        );
        return Err(AppError::forbidden());
    }

    let present = state
        .storage
        .exists(&doc.stored_filename)
        .await
        .map_err(AppError::internal)?;
    if !present {
        error!(
            document_id = %doc.id,
            stored_filename = %doc.stored_filename,
            "storage integrity fault: document row has no blob"
        );
        return Err(AppError::blob_missing());
    }

    let stream = state
        .storage
        .open_blob(&doc.stored_filename)
        .await
        .map_err(AppError::internal)?;

    let content_type = mime_guess::from_path(&doc.stored_filename)
        .first_or_octet_stream()
        .to_string();
    let disposition = HeaderValue::from_str(&attachment_content_disposition(&doc.title))
        .map_err(AppError::internal)?;
    let content_type = HeaderValue::from_str(&content_type).map_err(AppError::internal)?;

    info!(document_id = %doc.id, user_id = %user.user_id, "document download started");

    Ok((
        [(CONTENT_TYPE, content_type), (CONTENT_DISPOSITION, disposition)],
        Body::from_stream(stream),
    )
        .into_response())
}

struct UploadForm {
    bytes: Vec<u8>,
    original_name: String,
    content_type: Option<String>,
    owner_id: Uuid,
    title: String,
    kind: DocumentKind,
}

async fn read_upload_form(mut multipart: Multipart) -> AppResult<UploadForm> {
    let mut file: Option<(Vec<u8>, Option<String>, Option<String>)> = None;
    let mut owner_id: Option<String> = None;
    let mut title: Option<String> = None;
    let mut kind: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        let msg = format!("invalid multipart data: {err}");
        warn!(error = %err, "invalid multipart data");
        AppError::bad_request(msg)
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().map(|n| n.to_string());
                let content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    let msg = format!("failed to read file bytes: {err}");
                    warn!(error = %err, "failed to read file bytes");
                    AppError::bad_request(msg)
                })?;
                file = Some((data.to_vec(), file_name, content_type));
            }
            Some(text_field @ ("userId" | "title" | "type")) => {
                let value = field.text().await.map_err(|err| {
                    let msg = format!("invalid {text_field} field: {err}");
                    warn!(error = %err, field = text_field, "invalid multipart text field");
                    AppError::bad_request(msg)
                })?;
                let slot = match text_field {
                    "userId" => &mut owner_id,
                    "title" => &mut title,
                    _ => &mut kind,
                };
                *slot = Some(value);
            }
            _ => {}
        }
    }

    let (bytes, original_name, content_type) = file.ok_or_else(|| {
        warn!("upload rejected: missing file field");
        AppError::missing_file()
    })?;
    if bytes.is_empty() {
        warn!("upload rejected: empty file payload");
        return Err(AppError::bad_request("file field must not be empty"));
    }

    let owner_id = owner_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request("userId is required"))
        .and_then(|value| {
            Uuid::parse_str(value).map_err(|_| AppError::bad_request("userId must be a valid UUID"))
        })?;

    let title = title
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request("title is required"))?;

    let kind = kind
        .as_deref()
        .ok_or_else(|| AppError::bad_request("type is required"))
        .and_then(|value| DocumentKind::from_str(value).map_err(AppError::bad_request))?;

    Ok(UploadForm {
        bytes,
        original_name: original_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ORIGINAL_NAME.to_string()),
        content_type,
        owner_id,
        title,
        kind,
    })
}

pub async fn upload_document(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let form = read_upload_form(multipart).await?;

    let mut conn = state.db()?;
    let owner: User = users::table
        .find(form.owner_id)
        .select(User::as_select())
        .first(&mut conn)?;
    drop(conn);

    let stored_filename = generate_stored_filename(&form.original_name);
    let size_bytes = form.bytes.len();
    state
        .storage
        .put_blob(&stored_filename, form.bytes, form.content_type)
        .await
        .map_err(|err| {
            error!(error = %err, stored_filename = %stored_filename, "failed to store document blob");
            AppError::internal(err)
        })?;

    let new_document = NewDocument {
        id: Uuid::new_v4(),
        owner_user_id: owner.id,
        kind: form.kind.as_str().to_string(),
        title: form.title.clone(),
        stored_filename: stored_filename.clone(),
    };

    let inserted = state.db().and_then(|mut conn| {
        diesel::insert_into(documents::table)
            .values(&new_document)
            .execute(&mut conn)
            .map_err(AppError::from)
    });
    if let Err(err) = inserted {
        error!(stored_filename = %stored_filename, "document row insert failed, removing blob");
        if let Err(cleanup) = state.storage.delete_blob(&stored_filename).await {
            error!(error = %cleanup, stored_filename = %stored_filename, "failed to remove orphaned blob");
        }
        return Err(err);
    }

    info!(
        document_id = %new_document.id,
        owner_id = %owner.id,
        uploaded_by = %admin.user_id,
        kind = form.kind.as_str(),
        size_bytes,
        "document upload succeeded"
    );

    let notification = templates::new_document(
        &owner.email,
        &owner.company_name,
        form.kind,
        &form.title,
        &state.config.public_site_url,
    );
    if let Err(err) = state.mailer.send(notification).await {
        warn!(error = %err, document_id = %new_document.id, "new document notification failed");
    }

    Ok((
        StatusCode::CREATED,
        MessageResponse::new("Document uploaded"),
    ))
}
