use axum::{extract::State, http::header, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::services::settings;
use crate::AppState;

/// Published JSON Web Key Set. Unauthenticated.
pub async fn jwks(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let jwks = settings::jwks(&state.db).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Json(jwks),
    ))
}
