//! Bearer token verification against the registry's published keys.
//!
//! The signature is checked before anything in the payload is looked at.
//! Expiry is only reported for tokens whose signature verified, so a forged
//! token never learns whether its claimed expiry would have passed.

use axum::http::{header, HeaderMap};
use chrono::Utc;
use jsonwebtoken::{
    decode, decode_header,
    errors::ErrorKind,
    jwk::{Jwk, JwkSet},
    Algorithm, DecodingKey, Validation,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use thiserror::Error;

/// Identity asserted by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub name: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Deserialize)]
struct SignedClaims {
    exp: Option<i64>,
    #[serde(flatten)]
    custom: Claims,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("no bearer token found")]
    NoBearerToken,

    #[error("invalid jwt signature: {0}")]
    InvalidSignature(String),

    #[error("token is expired")]
    Expired,

    #[error("invalid token claims: {0}")]
    InvalidClaims(String),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Unauthorized(anyhow::anyhow!(err.to_string()))
    }
}

/// The raw token from the `Authorization` header. A `Bearer ` prefix is
/// stripped when present; anything else is handed to the parser as is.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, TokenError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(TokenError::NoBearerToken)?
        .to_str()
        .map_err(|_| TokenError::InvalidSignature("malformed authorization header".into()))?
        .trim();

    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if token.is_empty() {
        return Err(TokenError::NoBearerToken);
    }
    Ok(token)
}

/// Key named by the token's `kid`, or the only key when the token names none.
fn select_key<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> Result<&'a Jwk, TokenError> {
    let key = match kid {
        Some(kid) => jwks.find(kid),
        None if jwks.keys.len() == 1 => jwks.keys.first(),
        None => None,
    };
    key.ok_or_else(|| TokenError::InvalidSignature("no matching key in key set".into()))
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => {
            TokenError::InvalidClaims(err.to_string())
        }
        _ => TokenError::InvalidSignature(err.to_string()),
    }
}

pub fn verify_token(token: &str, jwks: &JwkSet) -> Result<Claims, TokenError> {
    verify_token_at(token, jwks, Utc::now().timestamp())
}

/// Verify `token` as of `now` (unix seconds).
pub fn verify_token_at(token: &str, jwks: &JwkSet, now: i64) -> Result<Claims, TokenError> {
    let header = decode_header(token).map_err(|e| TokenError::InvalidSignature(e.to_string()))?;
    let jwk = select_key(jwks, header.kid.as_deref())?;
    let key = DecodingKey::from_jwk(jwk).map_err(|e| TokenError::InvalidSignature(e.to_string()))?;

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let verified = decode::<SignedClaims>(token, &key, &validation).map_err(classify)?;

    match verified.claims.exp {
        Some(exp) if now > exp => Err(TokenError::Expired),
        Some(_) => Ok(verified.claims.custom),
        None => Err(TokenError::InvalidClaims("missing exp".into())),
    }
}

/// Extract and verify the request's bearer token.
pub fn verify_bearer(headers: &HeaderMap, jwks: &JwkSet) -> Result<Claims, TokenError> {
    verify_token(bearer_token(headers)?, jwks)
}
