//! Request context: the resolved caller plus the transaction their work runs in.

use axum::http::{header, HeaderMap};
use chrono::Utc;
use service_core::error::AppError;
use sqlx::{Sqlite, SqliteConnection, Transaction};

use crate::db::{self, Database};
use crate::models::{AccessKey, Identity, SCOPE_PASSWORD_RESET};
use crate::services::access_keys::{parse_raw_key, secret_matches};

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub identity: Identity,
    /// The key that authenticated this request, when one did.
    pub access_key: Option<AccessKey>,
}

impl Principal {
    pub fn identity_id(&self) -> i64 {
        self.identity.id
    }

    /// True when the request was authenticated by a one-time reset key.
    pub fn is_password_reset_only(&self) -> bool {
        self.access_key
            .as_ref()
            .map(|k| k.has_scope(SCOPE_PASSWORD_RESET))
            .unwrap_or(false)
    }
}

/// Everything a registry operation needs to know about the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    db: Database,
    principal: Option<Principal>,
}

impl RequestContext {
    pub fn anonymous(db: Database) -> Self {
        Self {
            db,
            principal: None,
        }
    }

    pub fn authenticated(db: Database, principal: Principal) -> Self {
        Self {
            db,
            principal: Some(principal),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Open a transaction bound to this request's principal.
    pub async fn begin(&self) -> Result<Txn, AppError> {
        Ok(Txn {
            tx: self.db.begin().await?,
            principal: self.principal.clone(),
        })
    }
}

/// A request-scoped transaction. Dropping it without `commit` rolls back.
pub struct Txn {
    tx: Transaction<'static, Sqlite>,
    principal: Option<Principal>,
}

impl Txn {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// The principal, or `Unauthorized` for anonymous requests.
    pub fn require_principal(&self) -> Result<&Principal, AppError> {
        self.principal
            .as_ref()
            .ok_or_else(|| AppError::unauthorized("authentication required"))
    }

    pub async fn commit(self) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// The bearer credential in an `Authorization` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the request's principal from its headers. No credential yields an
/// anonymous context; a bad one is `Unauthorized`.
pub async fn resolve(db: &Database, headers: &HeaderMap) -> Result<RequestContext, AppError> {
    match bearer_token(headers) {
        None => Ok(RequestContext::anonymous(db.clone())),
        Some(raw) => {
            let principal = authenticate(db, raw).await?;
            Ok(RequestContext::authenticated(db.clone(), principal))
        }
    }
}

/// Validate a raw access key and load its owner.
///
/// Expired keys behave exactly like unknown ones. A renewable key has its
/// extension deadline pushed forward on success.
pub async fn authenticate(db: &Database, raw_key: &str) -> Result<Principal, AppError> {
    let invalid = || AppError::unauthorized("invalid access key");

    let (key_id, secret) = parse_raw_key(raw_key).ok_or_else(invalid)?;

    let mut tx = db.begin().await?;
    let mut key = db::access_keys::find_by_key_id(&mut tx, key_id)
        .await?
        .ok_or_else(invalid)?;

    if !secret_matches(&key, secret) {
        tracing::debug!(key_id = %key_id, "access key secret mismatch");
        return Err(invalid());
    }

    let now = Utc::now();
    if !key.is_usable(now) {
        tracing::debug!(key_id = %key_id, "access key expired");
        return Err(invalid());
    }

    let identity = db::identities::find(&mut tx, key.issued_for)
        .await?
        .ok_or_else(invalid)?;

    if let Some(deadline) = key.renewed_deadline(now) {
        db::access_keys::update_extension_deadline(&mut tx, key.id, deadline).await?;
        key.extension_deadline = Some(deadline);
    }
    tx.commit().await?;

    Ok(Principal {
        identity,
        access_key: Some(key),
    })
}
