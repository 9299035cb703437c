pub mod certs;
pub mod config;
pub mod jwks;
pub mod proxy;
pub mod tls;
pub mod token;

use axum::{
    extract::{Request, State},
    middleware::from_fn,
    response::Response,
    routing::get,
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::certs::CertCache;
use crate::config::ConnectorConfig;
use crate::jwks::JwksCache;
use crate::proxy::Forwarder;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConnectorConfig>,
    pub certs: Arc<CertCache>,
    pub jwks: Arc<JwksCache>,
    pub forwarder: Forwarder,
}

impl AppState {
    pub fn new(config: ConnectorConfig, certs: CertCache) -> Result<Self, AppError> {
        let jwks = JwksCache::new(config.jwks_url(), config.jwks_ttl())?;
        Self::with_jwks(config, certs, jwks)
    }

    pub fn with_jwks(
        config: ConnectorConfig,
        certs: CertCache,
        jwks: JwksCache,
    ) -> Result<Self, AppError> {
        let forwarder = Forwarder::new(config.upstream_url.clone())?;

        Ok(Self {
            config: Arc::new(config),
            certs: Arc::new(certs),
            jwks: Arc::new(jwks),
            forwarder,
        })
    }
}

/// `/health` is served locally; every other path is verified and forwarded.
/// Forwarded responses keep the backend's own security headers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(health_check).layer(from_fn(security_headers_middleware)),
        )
        .fallback(proxy)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>))
        .layer(from_fn(request_id_middleware))
}

pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "hosts": state.certs.hosts().len(),
    }))
}

async fn proxy(State(state): State<AppState>, req: Request) -> Result<Response, AppError> {
    let claims = {
        let token = token::bearer_token(req.headers())?;
        let keys = state.jwks.get().await?;
        token::verify_token(token, &keys).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            e
        })?
    };

    state.forwarder.forward(req, &claims).await
}
