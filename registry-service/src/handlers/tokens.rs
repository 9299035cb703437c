use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::middleware::Ctx;
use crate::AppState;

/// Sign a short-lived token for the caller.
pub async fn create_token(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
) -> Result<impl IntoResponse, AppError> {
    let token = state.tokens.create_token(&ctx).await?;
    Ok((StatusCode::CREATED, Json(token)))
}
