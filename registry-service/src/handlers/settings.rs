use axum::{response::IntoResponse, Json};
use service_core::error::AppError;
use validator::Validate;

use crate::middleware::Ctx;
use crate::models::PasswordPolicy;
use crate::services::settings;

pub async fn get_password_policy(Ctx(ctx): Ctx) -> Result<impl IntoResponse, AppError> {
    Ok(Json(settings::password_policy(&ctx).await?))
}

pub async fn update_password_policy(
    Ctx(ctx): Ctx,
    Json(policy): Json<PasswordPolicy>,
) -> Result<impl IntoResponse, AppError> {
    policy.validate()?;
    Ok(Json(settings::update_password_policy(&ctx, &policy).await?))
}
