pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Duration;
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::RegistryConfig;
use crate::db::Database;
use crate::services::password_policy::BadPasswordList;
use crate::services::{CredentialService, DataKey, ProviderService, TokenService};

/// Shared state. Everything here is immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RegistryConfig>,
    pub db: Database,
    pub data_key: Arc<DataKey>,
    pub credentials: CredentialService,
    pub tokens: TokenService,
    pub providers: ProviderService,
}

impl AppState {
    pub fn new(config: RegistryConfig, db: Database, data_key: DataKey) -> Self {
        let data_key = Arc::new(data_key);
        let credentials =
            CredentialService::new(BadPasswordList::new(config.bad_passwords_file.clone()));
        let tokens = TokenService::new(
            data_key.clone(),
            config.service_name.clone(),
            Duration::minutes(config.token_expiry_minutes),
        );
        let providers = ProviderService::new(data_key.clone());

        Self {
            config: Arc::new(config),
            db,
            data_key,
            credentials,
            tokens,
            providers,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/setup", get(handlers::setup::setup_required).post(handlers::setup::setup))
        .route(
            "/api/identities",
            get(handlers::identities::list_identities).post(handlers::identities::create_identity),
        )
        .route("/api/identities/self", get(handlers::identities::get_self))
        .route(
            "/api/identities/:id",
            get(handlers::identities::get_identity).delete(handlers::identities::delete_identity),
        )
        .route(
            "/api/identities/:id/credential",
            post(handlers::credentials::create_credential)
                .put(handlers::credentials::update_credential),
        )
        .route(
            "/api/access-keys",
            get(handlers::access_keys::list_access_keys)
                .post(handlers::access_keys::create_access_key),
        )
        .route("/api/access-keys/:id", delete(handlers::access_keys::delete_access_key))
        .route("/api/logout", post(handlers::access_keys::logout))
        .route("/api/tokens", post(handlers::tokens::create_token))
        .route(
            "/api/grants",
            get(handlers::grants::list_grants).post(handlers::grants::create_grant),
        )
        .route(
            "/api/grants/:id",
            get(handlers::grants::get_grant).delete(handlers::grants::delete_grant),
        )
        .route(
            "/api/groups",
            get(handlers::groups::list_groups).post(handlers::groups::create_group),
        )
        .route("/api/groups/:id/members", get(handlers::groups::list_members))
        .route(
            "/api/groups/:id/members/:identity_id",
            put(handlers::groups::add_member).delete(handlers::groups::remove_member),
        )
        .route(
            "/api/settings/password-policy",
            get(handlers::settings::get_password_policy)
                .put(handlers::settings::update_password_policy),
        )
        .route(
            "/api/providers",
            get(handlers::providers::list_providers).post(handlers::providers::create_provider),
        )
        .route("/api/providers/:id", delete(handlers::providers::delete_provider))
        .route(
            "/api/providers/:id/tokens",
            get(handlers::providers::token_status).put(handlers::providers::store_tokens),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::context_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/.well-known/jwks.json", get(handlers::well_known::jwks))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
}

pub async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.db.health_check().await?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
    })))
}
