//! Grant CRUD. Evaluation lives in `authz`.

use service_core::error::AppError;

use crate::db::{self, grants::GrantFilter};
use crate::models::{Grant, Subject};
use crate::services::authz::{self, Operation, Role, RESOURCE_INFRA};
use crate::services::context::RequestContext;

/// List grants. Admins see everything; anyone may list their own.
pub async fn list_grants(ctx: &RequestContext, filter: &GrantFilter) -> Result<Vec<Grant>, AppError> {
    let own = ctx
        .principal()
        .map(|p| p.identity.subject())
        .filter(|own| filter.subject == Some(*own));

    let mut txn = match own {
        Some(Subject::Identity(id)) => authz::authorize(ctx, Operation::ReadGrants, id).await?.0,
        _ => authz::require_role(ctx, Role::Admin).await?,
    };

    let grants = db::grants::list(txn.conn(), filter).await?;
    txn.commit().await?;
    Ok(grants)
}

pub async fn get_grant(ctx: &RequestContext, id: i64) -> Result<Grant, AppError> {
    let mut txn = ctx.begin().await?;
    let principal = txn.require_principal()?.clone();
    let grant = db::grants::get(txn.conn(), id).await?;

    if grant.subject() != Some(principal.identity.subject()) {
        authz::is_authorized(&mut txn, Role::Admin).await?;
    } else {
        authz::authorize_in(&mut txn, Operation::ReadGrants, principal.identity_id()).await?;
    }

    txn.commit().await?;
    Ok(grant)
}

/// Create a grant, returning the existing one when the exact triple is
/// already present.
pub async fn create_grant(
    ctx: &RequestContext,
    subject: Subject,
    resource: &str,
    privilege: &str,
) -> Result<Grant, AppError> {
    let resource = resource.trim();
    let privilege = privilege.trim();
    if resource.is_empty() || privilege.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "resource and privilege are required"
        )));
    }
    if resource == RESOURCE_INFRA && privilege.parse::<Role>().is_err() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "unknown privilege for {}: {}",
            RESOURCE_INFRA,
            privilege
        )));
    }

    let mut txn = authz::require_role(ctx, Role::Admin).await?;
    match subject {
        Subject::Identity(id) => {
            db::identities::get(txn.conn(), id).await?;
        }
        Subject::Group(id) => {
            db::groups::get(txn.conn(), id).await?;
        }
    }

    if let Some(existing) = db::grants::find_exact(txn.conn(), subject, resource, privilege).await? {
        txn.commit().await?;
        return Ok(existing);
    }

    let created_by = txn.principal().map(|p| p.identity_id());
    let grant = db::grants::insert(txn.conn(), subject, resource, privilege, created_by).await?;
    txn.commit().await?;

    tracing::info!(grant_id = grant.id, subject = %subject, resource, privilege, "grant created");
    Ok(grant)
}

pub async fn delete_grant(ctx: &RequestContext, id: i64) -> Result<(), AppError> {
    let mut txn = authz::require_role(ctx, Role::Admin).await?;
    db::grants::delete(txn.conn(), id).await?;
    txn.commit().await?;

    tracing::info!(grant_id = id, "grant deleted");
    Ok(())
}
