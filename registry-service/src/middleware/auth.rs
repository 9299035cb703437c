use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::services::context::{self, RequestContext};
use crate::AppState;

/// Resolve the caller and attach a `RequestContext` to the request.
///
/// Requests without credentials continue anonymously; the operation decides
/// whether that is enough. An invalid credential is rejected here.
pub async fn context_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = context::resolve(&state.db, req.headers()).await?;

    if let Some(principal) = ctx.principal() {
        tracing::Span::current().record("identity_id", principal.identity_id());
    }

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Extractor for the context set by `context_middleware`.
pub struct Ctx(pub RequestContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(Ctx)
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "request context missing from request extensions"
                ))
            })
    }
}
