use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use service_core::error::AppError;
use validator::Validate;

use crate::middleware::Ctx;
use crate::models::AccessKeyResponse;
use crate::services::access_keys::{self, CreateAccessKey};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccessKeyRequest {
    /// Defaults to the caller.
    pub identity_id: Option<i64>,
    #[validate(length(max = 256, message = "must be at most 256 characters"))]
    pub name: Option<String>,
    #[validate(range(min = 1i64, max = 3155760000i64, message = "must be between 1 second and 100 years"))]
    pub ttl_seconds: Option<i64>,
    #[validate(range(min = 1i64, max = 3155760000i64, message = "must be between 1 second and 100 years"))]
    pub extension_seconds: Option<i64>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccessKeyResponse {
    #[serde(flatten)]
    pub key: AccessKeyResponse,
    pub access_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAccessKeysQuery {
    pub identity_id: Option<i64>,
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub show_expired: bool,
}

fn seconds(field: &str, secs: i64) -> Result<Duration, AppError> {
    Duration::try_seconds(secs)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("{} is out of range", field)))
}

pub async fn create_access_key(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Json(req): Json<CreateAccessKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let issued_for = match req.identity_id {
        Some(id) => id,
        None => ctx
            .principal()
            .map(|p| p.identity_id())
            .ok_or_else(|| AppError::unauthorized("authentication required"))?,
    };

    let session = &state.config.session;
    let issued = access_keys::create_access_key(
        &ctx,
        &CreateAccessKey {
            issued_for,
            name: req.name,
            ttl: Some(seconds(
                "ttlSeconds",
                req.ttl_seconds
                    .unwrap_or(session.duration_hours.saturating_mul(3600)),
            )?),
            extension: Some(seconds(
                "extensionSeconds",
                req.extension_seconds
                    .unwrap_or(session.extension_hours.saturating_mul(3600)),
            )?),
            scopes: req.scopes,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateAccessKeyResponse {
            key: issued.key.into(),
            access_key: issued.raw,
        }),
    ))
}

/// Keys of the caller, of `identityId`, or of everyone with `all=true`.
pub async fn list_access_keys(
    Ctx(ctx): Ctx,
    Query(query): Query<ListAccessKeysQuery>,
) -> Result<impl IntoResponse, AppError> {
    let owner = if query.all {
        None
    } else {
        Some(match query.identity_id {
            Some(id) => id,
            None => ctx
                .principal()
                .map(|p| p.identity_id())
                .ok_or_else(|| AppError::unauthorized("authentication required"))?,
        })
    };

    let keys: Vec<AccessKeyResponse> =
        access_keys::list_access_keys(&ctx, owner, query.show_expired)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
    Ok(Json(keys))
}

pub async fn delete_access_key(
    Ctx(ctx): Ctx,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    access_keys::delete_access_key(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Revoke every key of the caller.
pub async fn logout(Ctx(ctx): Ctx) -> Result<impl IntoResponse, AppError> {
    let removed = access_keys::delete_all_access_keys(&ctx).await?;
    Ok(Json(json!({ "deleted": removed })))
}
