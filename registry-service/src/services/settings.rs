use service_core::error::AppError;

use crate::db::{self, Database};
use crate::models::{PasswordPolicy, Settings};
use crate::services::authz::{self, Role};
use crate::services::context::RequestContext;
use crate::services::encryption::DataKey;
use crate::services::tokens::{self, JwkSet};

/// Create the settings row on first boot. Later boots leave it untouched.
pub async fn init_settings(
    db: &Database,
    data_key: &DataKey,
    default_policy: &PasswordPolicy,
) -> Result<Settings, AppError> {
    let mut tx = db.begin().await?;
    if let Some(existing) = db::settings::find(&mut tx).await? {
        return Ok(existing);
    }

    let generated = tokens::generate_signing_key(data_key)?;
    let public_jwk = serde_json::to_string(&generated.public_jwk)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;
    db::settings::insert(
        &mut tx,
        &generated.sealed_private_key,
        &public_jwk,
        default_policy,
    )
    .await?;
    let settings = db::settings::get(&mut tx).await?;
    tx.commit().await?;

    tracing::info!(kid = %generated.public_jwk.kid, "settings initialised");
    Ok(settings)
}

/// Published key set. Needs no authentication.
pub async fn jwks(db: &Database) -> Result<JwkSet, AppError> {
    let mut tx = db.begin().await?;
    let settings = db::settings::get(&mut tx).await?;
    tx.commit().await?;
    tokens::jwks(&settings)
}

pub async fn password_policy(ctx: &RequestContext) -> Result<PasswordPolicy, AppError> {
    let mut txn = ctx.begin().await?;
    let policy = db::settings::get(txn.conn()).await?.password_policy();
    txn.commit().await?;
    Ok(policy)
}

pub async fn update_password_policy(
    ctx: &RequestContext,
    policy: &PasswordPolicy,
) -> Result<PasswordPolicy, AppError> {
    let mut txn = authz::require_role(ctx, Role::Admin).await?;
    db::settings::update_policy(txn.conn(), policy).await?;
    let updated = db::settings::get(txn.conn()).await?.password_policy();
    txn.commit().await?;

    tracing::info!(policy = ?updated, "password policy updated");
    Ok(updated)
}
