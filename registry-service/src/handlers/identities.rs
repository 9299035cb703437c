use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

use crate::middleware::Ctx;
use crate::models::{IdentityKind, IdentityResponse};
use crate::services::identities;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateIdentityRequest {
    #[validate(length(min = 1, max = 256, message = "must be between 1 and 256 characters"))]
    pub name: String,
    pub kind: IdentityKind,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIdentityResponse {
    #[serde(flatten)]
    pub identity: IdentityResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_time_password: Option<String>,
}

pub async fn create_identity(
    Ctx(ctx): Ctx,
    Json(req): Json<CreateIdentityRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let created = identities::create_identity(&ctx, &req.name, req.kind).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateIdentityResponse {
            identity: created.identity.into(),
            one_time_password: created.one_time_password,
        }),
    ))
}

pub async fn list_identities(Ctx(ctx): Ctx) -> Result<impl IntoResponse, AppError> {
    let items: Vec<IdentityResponse> = identities::list_identities(&ctx)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(items))
}

pub async fn get_identity(
    Ctx(ctx): Ctx,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let identity = identities::get_identity(&ctx, id).await?;
    Ok(Json(IdentityResponse::from(identity)))
}

/// The calling identity.
pub async fn get_self(Ctx(ctx): Ctx) -> Result<impl IntoResponse, AppError> {
    let id = ctx
        .principal()
        .map(|p| p.identity_id())
        .ok_or_else(|| AppError::unauthorized("authentication required"))?;
    let identity = identities::get_identity(&ctx, id).await?;
    Ok(Json(IdentityResponse::from(identity)))
}

pub async fn delete_identity(
    Ctx(ctx): Ctx,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    identities::delete_identity(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
