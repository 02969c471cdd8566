use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod chat;
pub mod documents;
pub mod health;
pub mod services;
pub mod users;

fn cors_layer(allowed: Option<&String>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(err) => {
                        warn!(origin = value, error = %err, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_ref());
    let body_limit = state.config.max_upload_bytes;

    let public_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route("/inteli-chat", post(chat::chat_reply))
        .route("/inteli-chat/lead", post(chat::capture_lead))
        .route("/health", get(health::health_check));

    // Role checks happen per handler through the `AdminUser` extractor.
    let admin_routes = Router::new()
        .route("/create-user", post(users::create_user))
        .route("/users", get(users::list_users))
        .route("/add-service", post(services::add_service))
        .route("/all-services", get(services::list_all_services))
        .route(
            "/services/:id",
            put(services::update_service).delete(services::delete_service),
        )
        .route("/services/:id/toggle", post(services::toggle_service))
        .route("/upload", post(documents::upload_document))
        .route("/documents", get(documents::list_all_documents));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .route("/change-password", post(auth::change_password))
        .route("/me", get(auth::me))
        .route("/documents", get(documents::list_documents))
        .route("/documents/:id/download", get(documents::download_document))
        .route("/services", get(services::list_my_services))
        .nest("/admin", admin_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
