use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

use crate::middleware::Ctx;
use crate::models::ProviderResponse;
use crate::services::providers::NewProvider;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProviderRequest {
    #[validate(length(min = 1, max = 256, message = "must be between 1 and 256 characters"))]
    pub name: String,
    #[validate(url(message = "must be a valid url"))]
    pub url: String,
    #[validate(length(min = 1, message = "is required"))]
    pub client_id: String,
    #[validate(length(min = 1, message = "is required"))]
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreTokensRequest {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTokenStatus {
    pub expires_at: DateTime<Utc>,
    pub refresh_due: bool,
}

pub async fn create_provider(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Json(req): Json<CreateProviderRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let provider = state
        .providers
        .create_provider(
            &ctx,
            &NewProvider {
                name: req.name,
                url: req.url,
                client_id: req.client_id,
                client_secret: req.client_secret,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ProviderResponse::from(provider))))
}

pub async fn list_providers(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
) -> Result<impl IntoResponse, AppError> {
    let items: Vec<ProviderResponse> = state
        .providers
        .list_providers(&ctx)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(items))
}

pub async fn delete_provider(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.providers.delete_provider(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Store the caller's tokens for a provider.
pub async fn store_tokens(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Path(id): Path<i64>,
    Json(req): Json<StoreTokensRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .providers
        .store_tokens(&ctx, id, &req.access_token, &req.refresh_token, req.expires_at)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Expiry of the caller's provider tokens. Token values are never returned.
pub async fn token_status(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state.providers.tokens(&ctx, id).await?;
    Ok(Json(ProviderTokenStatus {
        expires_at: tokens.expires_at,
        refresh_due: tokens.refresh_due,
    }))
}
