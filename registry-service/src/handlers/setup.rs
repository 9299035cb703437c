use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;

use crate::middleware::Ctx;
use crate::services::setup;
use crate::AppState;

pub async fn setup_required(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let required = setup::setup_required(&state.db).await?;
    Ok(Json(json!({ "required": required })))
}

pub async fn setup(Ctx(ctx): Ctx) -> Result<impl IntoResponse, AppError> {
    let response = setup::setup(&ctx).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
