//! Identity and group management.

use service_core::error::AppError;

use crate::db;
use crate::models::{Group, Identity, IdentityKind};
use crate::services::authz::{self, Operation, Role};
use crate::services::context::RequestContext;
use crate::services::credentials::{store_temporary_in, TemporaryPassword};

/// A newly created identity. Users get a one-time password.
#[derive(Debug, Clone)]
pub struct CreatedIdentity {
    pub identity: Identity,
    pub one_time_password: Option<String>,
}

fn validate_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() || name.len() > 256 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "name must be between 1 and 256 characters"
        )));
    }
    Ok(name)
}

pub async fn create_identity(
    ctx: &RequestContext,
    name: &str,
    kind: IdentityKind,
) -> Result<CreatedIdentity, AppError> {
    let name = validate_name(name)?;
    let password = match kind {
        IdentityKind::User => {
            authz::require_role(ctx, Role::Admin).await?.commit().await?;
            Some(TemporaryPassword::generate().await?)
        }
        IdentityKind::Machine => None,
    };

    let mut txn = authz::require_role(ctx, Role::Admin).await?;

    if db::identities::find_by_name(txn.conn(), name).await?.is_some() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "an identity with that name already exists"
        )));
    }
    let identity = db::identities::insert(txn.conn(), name, kind, "").await?;

    if let Some(password) = &password {
        store_temporary_in(txn.conn(), identity.id, password).await?;
    }

    txn.commit().await?;
    tracing::info!(identity_id = identity.id, kind = kind.as_str(), "identity created");

    Ok(CreatedIdentity {
        identity,
        one_time_password: password.map(TemporaryPassword::into_plaintext),
    })
}

pub async fn get_identity(ctx: &RequestContext, id: i64) -> Result<Identity, AppError> {
    let (mut txn, _) = authz::authorize(ctx, Operation::ReadIdentity, id).await?;
    let identity = db::identities::get(txn.conn(), id).await?;
    txn.commit().await?;
    Ok(identity)
}

pub async fn list_identities(ctx: &RequestContext) -> Result<Vec<Identity>, AppError> {
    let mut txn = authz::require_role(ctx, Role::View).await?;
    let identities = db::identities::list(txn.conn()).await?;
    txn.commit().await?;
    Ok(identities)
}

/// Soft-delete an identity together with its keys, credential and grants.
pub async fn delete_identity(ctx: &RequestContext, id: i64) -> Result<(), AppError> {
    let mut txn = authz::require_role(ctx, Role::Admin).await?;
    if txn.principal().map(|p| p.identity_id()) == Some(id) {
        return Err(AppError::BadRequest(anyhow::anyhow!("cannot delete self")));
    }

    db::identities::soft_delete(txn.conn(), id).await?;
    txn.commit().await?;

    tracing::info!(identity_id = id, "identity deleted");
    Ok(())
}

pub async fn create_group(ctx: &RequestContext, name: &str) -> Result<Group, AppError> {
    let name = validate_name(name)?;
    let mut txn = authz::require_role(ctx, Role::Admin).await?;
    let group = db::groups::insert(txn.conn(), name).await?;
    txn.commit().await?;

    tracing::info!(group_id = group.id, "group created");
    Ok(group)
}

pub async fn list_groups(ctx: &RequestContext) -> Result<Vec<Group>, AppError> {
    let mut txn = authz::require_role(ctx, Role::View).await?;
    let groups = db::groups::list(txn.conn()).await?;
    txn.commit().await?;
    Ok(groups)
}

pub async fn group_members(ctx: &RequestContext, group_id: i64) -> Result<Vec<i64>, AppError> {
    let mut txn = authz::require_role(ctx, Role::View).await?;
    db::groups::get(txn.conn(), group_id).await?;
    let members = db::groups::member_ids(txn.conn(), group_id).await?;
    txn.commit().await?;
    Ok(members)
}

pub async fn add_member(
    ctx: &RequestContext,
    group_id: i64,
    identity_id: i64,
) -> Result<(), AppError> {
    let mut txn = authz::require_role(ctx, Role::Admin).await?;
    db::groups::get(txn.conn(), group_id).await?;
    db::identities::get(txn.conn(), identity_id).await?;
    db::groups::add_member(txn.conn(), group_id, identity_id).await?;
    txn.commit().await?;

    tracing::info!(group_id, identity_id, "group member added");
    Ok(())
}

pub async fn remove_member(
    ctx: &RequestContext,
    group_id: i64,
    identity_id: i64,
) -> Result<(), AppError> {
    let mut txn = authz::require_role(ctx, Role::Admin).await?;
    if !db::groups::remove_member(txn.conn(), group_id, identity_id).await? {
        return Err(AppError::not_found("group member"));
    }
    txn.commit().await?;

    tracing::info!(group_id, identity_id, "group member removed");
    Ok(())
}
