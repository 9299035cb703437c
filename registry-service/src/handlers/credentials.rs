use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;

use crate::middleware::Ctx;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCredentialRequest {
    pub old_password: Option<String>,
    pub password: String,
}

/// Admin: issue a one-time password for the identity.
pub async fn create_credential(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let password = state
        .credentials
        .issue_temporary_credential(&ctx, id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "oneTimePassword": password })),
    ))
}

pub async fn update_credential(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCredentialRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .credentials
        .update_credential(&ctx, id, req.old_password.as_deref(), &req.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
