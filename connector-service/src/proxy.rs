//! Forwards verified requests to the protected backend as the token's identity.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use service_core::error::AppError;

use crate::token::Claims;

pub const IMPERSONATE_USER: &str = "impersonate-user";
pub const IMPERSONATE_GROUP: &str = "impersonate-group";

/// Largest request body buffered before forwarding.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Inbound headers minus credentials, hop-by-hop headers and any
/// caller-supplied impersonation, plus the verified identity.
pub fn upstream_headers(inbound: &HeaderMap, claims: &Claims) -> Result<HeaderMap, AppError> {
    let mut headers = HeaderMap::with_capacity(inbound.len() + claims.groups.len() + 1);
    for (name, value) in inbound {
        if is_hop_by_hop(name)
            || name == header::AUTHORIZATION
            || name == header::HOST
            || name.as_str().starts_with("impersonate-")
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let to_value = |raw: &str| {
        HeaderValue::from_str(raw).map_err(|_| {
            AppError::BadRequest(anyhow::anyhow!("identity is not a valid header value"))
        })
    };

    headers.insert(IMPERSONATE_USER, to_value(&claims.name)?);
    for group in &claims.groups {
        headers.append(IMPERSONATE_GROUP, to_value(group)?);
    }
    Ok(headers)
}

#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    upstream: String,
}

impl Forwarder {
    pub fn new(upstream: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            upstream: upstream.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Send `req` upstream as `claims` and stream the response back.
    pub async fn forward(&self, req: Request, claims: &Claims) -> Result<Response, AppError> {
        let (parts, body) = req.into_parts();
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.upstream, path);

        let headers = upstream_headers(&parts.headers, claims)?;
        let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("failed to read request body: {}", e)))?;

        tracing::debug!(method = %parts.method, url = %url, "forwarding request");

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("upstream request failed: {}", e))
            })?;

        let mut response = Response::builder().status(upstream.status());
        if let Some(out) = response.headers_mut() {
            for (name, value) in upstream.headers() {
                if !is_hop_by_hop(name) {
                    out.append(name.clone(), value.clone());
                }
            }
        }

        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("invalid upstream response: {}", e)))
    }
}
