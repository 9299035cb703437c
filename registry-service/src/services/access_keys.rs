//! Access key issuing, listing and revocation.
//!
//! A raw key is `<key_id>.<secret>`. Only SHA-256 of the secret is stored.

use chrono::{Duration, Utc};
use service_core::error::AppError;
use sha2::{Digest, Sha256};
use sqlx::SqliteConnection;
use subtle::ConstantTimeEq;

use crate::db::{self, access_keys::NewAccessKey, never};
use crate::models::{access_key::join_scopes, AccessKey};
use crate::services::authz::{self, Operation, Role};
use crate::services::context::RequestContext;
use crate::utils::{random_string, ALPHANUMERIC};

pub const KEY_ID_LEN: usize = 10;
pub const SECRET_LEN: usize = 24;

/// Split a raw key into its id and secret, rejecting malformed input.
pub fn parse_raw_key(raw: &str) -> Option<(&str, &str)> {
    let (key_id, secret) = raw.split_once('.')?;
    if key_id.len() != KEY_ID_LEN || secret.len() != SECRET_LEN {
        return None;
    }
    let valid = |s: &str| s.bytes().all(|b| b.is_ascii_alphanumeric());
    if !valid(key_id) || !valid(secret) {
        return None;
    }
    Some((key_id, secret))
}

pub fn hash_secret(secret: &str) -> Vec<u8> {
    Sha256::digest(secret.as_bytes()).to_vec()
}

pub fn secret_matches(key: &AccessKey, secret: &str) -> bool {
    hash_secret(secret).ct_eq(&key.secret_hash).into()
}

/// Parameters of a new key.
#[derive(Debug, Clone, Default)]
pub struct CreateAccessKey {
    pub issued_for: i64,
    /// Generated from the owner's name when absent.
    pub name: Option<String>,
    /// Lifetime; `None` never expires.
    pub ttl: Option<Duration>,
    /// Renewal window for session keys. Each use pushes the extension
    /// deadline to `now + extension`.
    pub extension: Option<Duration>,
    pub scopes: Vec<String>,
}

/// A freshly created key. `raw` is the only copy of the secret.
#[derive(Debug, Clone)]
pub struct IssuedAccessKey {
    pub key: AccessKey,
    pub raw: String,
}

/// Create a key without any authorization check. Callers are responsible for
/// deciding the caller may do this.
pub async fn issue(
    conn: &mut SqliteConnection,
    req: &CreateAccessKey,
) -> Result<IssuedAccessKey, AppError> {
    let owner = db::identities::get(conn, req.issued_for).await?;

    if matches!(req.ttl, Some(ttl) if ttl <= Duration::zero()) {
        return Err(AppError::BadRequest(anyhow::anyhow!("ttl must be positive")));
    }
    if matches!(req.extension, Some(ext) if ext <= Duration::zero()) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "extension deadline must be positive"
        )));
    }

    let now = Utc::now();
    let expires_at = match req.ttl {
        Some(ttl) => now.checked_add_signed(ttl).unwrap_or_else(never),
        None => never(),
    };
    let extension_deadline = req
        .extension
        .map(|ext| std::cmp::min(now.checked_add_signed(ext).unwrap_or_else(never), expires_at));

    let key_id = random_string(KEY_ID_LEN, ALPHANUMERIC);
    let secret = random_string(SECRET_LEN, ALPHANUMERIC);
    let secret_hash = hash_secret(&secret);

    let name = match req.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{}-{}", owner.name, key_id),
    };
    let scopes = join_scopes(&req.scopes);

    let key = db::access_keys::insert(
        conn,
        &NewAccessKey {
            key_id: &key_id,
            secret_hash: &secret_hash,
            name: &name,
            issued_for: owner.id,
            scopes: &scopes,
            expires_at,
            extension_deadline,
            extension_seconds: req.extension.map(|ext| ext.num_seconds()),
        },
    )
    .await?;

    tracing::info!(
        access_key_id = key.id,
        issued_for = owner.id,
        "access key created"
    );

    Ok(IssuedAccessKey {
        raw: format!("{}.{}", key_id, secret),
        key,
    })
}

/// Create a key for `req.issued_for`. Self-service, or admin for others.
pub async fn create_access_key(
    ctx: &RequestContext,
    req: &CreateAccessKey,
) -> Result<IssuedAccessKey, AppError> {
    let (mut txn, _) = authz::authorize(ctx, Operation::ManageAccessKeys, req.issued_for).await?;
    let issued = issue(txn.conn(), req).await?;
    txn.commit().await?;
    Ok(issued)
}

/// Keys of `owner`, or of everyone when `owner` is `None` (admin only).
/// Keys that can no longer authenticate are hidden unless asked for.
pub async fn list_access_keys(
    ctx: &RequestContext,
    owner: Option<i64>,
    show_expired: bool,
) -> Result<Vec<AccessKey>, AppError> {
    let mut txn = match owner {
        Some(owner) => authz::authorize(ctx, Operation::ManageAccessKeys, owner).await?.0,
        None => authz::require_role(ctx, Role::Admin).await?,
    };

    let now = Utc::now();
    let keys = db::access_keys::list(txn.conn(), owner)
        .await?
        .into_iter()
        .filter(|k| show_expired || k.is_usable(now))
        .collect();
    txn.commit().await?;
    Ok(keys)
}

pub async fn delete_access_key(ctx: &RequestContext, id: i64) -> Result<(), AppError> {
    let mut txn = ctx.begin().await?;
    txn.require_principal()?;

    let key = db::access_keys::get(txn.conn(), id).await?;
    authz::authorize_in(&mut txn, Operation::ManageAccessKeys, key.issued_for).await?;

    db::access_keys::delete(txn.conn(), id).await?;
    txn.commit().await?;

    tracing::info!(access_key_id = id, issued_for = key.issued_for, "access key deleted");
    Ok(())
}

/// Revoke every key of the caller (logout).
pub async fn delete_all_access_keys(ctx: &RequestContext) -> Result<u64, AppError> {
    let mut txn = ctx.begin().await?;
    let identity_id = txn.require_principal()?.identity_id();
    authz::authorize_in(&mut txn, Operation::Logout, identity_id).await?;

    let removed = db::access_keys::delete_all_for(txn.conn(), identity_id).await?;
    txn.commit().await?;

    tracing::info!(identity_id, removed, "all access keys deleted");
    Ok(removed)
}
