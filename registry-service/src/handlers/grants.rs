use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;

use crate::db::grants::GrantFilter;
use crate::middleware::Ctx;
use crate::models::{GrantResponse, Subject};
use crate::services::grants;

#[derive(Debug, Deserialize)]
pub struct ListGrantsQuery {
    pub subject: Option<Subject>,
    pub resource: Option<String>,
    pub privilege: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGrantRequest {
    pub subject: Subject,
    pub resource: String,
    pub privilege: String,
}

pub async fn list_grants(
    Ctx(ctx): Ctx,
    Query(query): Query<ListGrantsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = GrantFilter {
        subject: query.subject,
        resource: query.resource,
        privilege: query.privilege,
    };
    let items: Vec<GrantResponse> = grants::list_grants(&ctx, &filter)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(items))
}

pub async fn get_grant(Ctx(ctx): Ctx, Path(id): Path<i64>) -> Result<impl IntoResponse, AppError> {
    let grant = grants::get_grant(&ctx, id).await?;
    Ok(Json(GrantResponse::from(grant)))
}

pub async fn create_grant(
    Ctx(ctx): Ctx,
    Json(req): Json<CreateGrantRequest>,
) -> Result<impl IntoResponse, AppError> {
    let grant = grants::create_grant(&ctx, req.subject, &req.resource, &req.privilege).await?;
    Ok((StatusCode::CREATED, Json(GrantResponse::from(grant))))
}

pub async fn delete_grant(
    Ctx(ctx): Ctx,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    grants::delete_grant(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
