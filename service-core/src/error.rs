use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Field-keyed validation failures. Each field may carry several messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build errors for a single field.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errs = Self::new();
        errs.add(field, message);
        errs
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// `Ok(())` when nothing was recorded, otherwise a validation error.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{}: {}", field, messages.join(", "))?;
        }
        Ok(())
    }
}

impl From<validator::ValidationErrors> for FieldErrors {
    fn from(errs: validator::ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        for (field, list) in errs.field_errors() {
            for err in list.iter() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                out.add(&field.to_string(), message);
            }
        }
        out
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn forbidden() -> Self {
        AppError::Forbidden(anyhow::anyhow!("forbidden"))
    }

    pub fn unauthorized(msg: &str) -> Self {
        AppError::Unauthorized(anyhow::anyhow!(msg.to_string()))
    }

    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(anyhow::anyhow!("{} not found", what))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InternalError(_)
            | AppError::DatabaseError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.into())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return AppError::NotFound(anyhow::anyhow!("record not found"));
        }

        let unique = err
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false);
        if unique {
            return AppError::Conflict(anyhow::anyhow!("a record with that value already exists"));
        }

        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldError {
    field_name: String,
    errors: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    code: u16,
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    field_errors: Vec<FieldError>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error, field_errors) = match self {
            AppError::Validation(errs) => {
                let fields = errs
                    .fields()
                    .map(|(name, messages)| FieldError {
                        field_name: name.to_string(),
                        errors: messages.to_vec(),
                    })
                    .collect();
                ("validation failed".to_string(), fields)
            }
            AppError::BadRequest(err)
            | AppError::NotFound(err)
            | AppError::Unauthorized(err)
            | AppError::Conflict(err) => (err.to_string(), Vec::new()),
            // never echo the role that was required or what the caller holds
            AppError::Forbidden(_) => ("forbidden".to_string(), Vec::new()),
            AppError::InternalError(err) => {
                tracing::error!(error = %format!("{:#}", err), "internal error");
                ("internal server error".to_string(), Vec::new())
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "database error");
                ("internal server error".to_string(), Vec::new())
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "configuration error");
                ("internal server error".to_string(), Vec::new())
            }
        };

        (
            status,
            Json(ErrorResponse {
                code: status.as_u16(),
                error,
                field_errors,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn field_errors_collect_multiple_messages() {
        let mut errs = FieldErrors::new();
        errs.add("password", "1 uppercase letter");
        errs.add("password", "1 number");
        errs.add("oldPassword", "is required");

        assert_eq!(
            errs.get("password"),
            Some(&["1 uppercase letter".to_string(), "1 number".to_string()][..])
        );
        assert_eq!(
            errs.to_string(),
            "oldPassword: is required; password: 1 uppercase letter, 1 number"
        );
    }

    #[test]
    fn empty_field_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[tokio::test]
    async fn forbidden_response_is_generic() {
        let err = AppError::Forbidden(anyhow::anyhow!("requires role admin"));
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let body = body_json(res).await;
        assert_eq!(body["error"], "forbidden");
        assert!(!body.to_string().contains("admin"));
    }

    #[tokio::test]
    async fn validation_response_lists_fields() {
        let err = AppError::Validation(FieldErrors::single("oldPassword", "invalid oldPassword"));
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(res).await;
        assert_eq!(body["fieldErrors"][0]["fieldName"], "oldPassword");
        assert_eq!(body["fieldErrors"][0]["errors"][0], "invalid oldPassword");
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
