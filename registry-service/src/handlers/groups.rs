use axum::{extract::Path, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;
use validator::Validate;

use crate::middleware::Ctx;
use crate::models::GroupResponse;
use crate::services::identities;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 256, message = "must be between 1 and 256 characters"))]
    pub name: String,
}

pub async fn create_group(
    Ctx(ctx): Ctx,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let group = identities::create_group(&ctx, &req.name).await?;
    Ok((StatusCode::CREATED, Json(GroupResponse::from(group))))
}

pub async fn list_groups(Ctx(ctx): Ctx) -> Result<impl IntoResponse, AppError> {
    let items: Vec<GroupResponse> = identities::list_groups(&ctx)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(items))
}

pub async fn list_members(
    Ctx(ctx): Ctx,
    Path(group_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let members = identities::group_members(&ctx, group_id).await?;
    Ok(Json(json!({ "identityIds": members })))
}

pub async fn add_member(
    Ctx(ctx): Ctx,
    Path((group_id, identity_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    identities::add_member(&ctx, group_id, identity_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_member(
    Ctx(ctx): Ctx,
    Path((group_id, identity_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    identities::remove_member(&ctx, group_id, identity_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
