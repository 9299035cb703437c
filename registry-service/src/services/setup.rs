//! First-run bootstrap of the admin machine identity.

use serde::Serialize;
use service_core::error::AppError;

use crate::db::{self, Database};
use crate::models::{identity::PERMISSION_ALL_INFRA, IdentityKind};
use crate::services::access_keys::{self, CreateAccessKey};
use crate::services::context::RequestContext;

pub const ADMIN_IDENTITY_NAME: &str = "admin";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupResponse {
    pub name: String,
    pub access_key: String,
}

pub async fn setup_required(db: &Database) -> Result<bool, AppError> {
    let mut tx = db.begin().await?;
    let required = db::settings::get(&mut tx).await?.setup_required;
    tx.commit().await?;
    Ok(required)
}

/// Create the `admin` identity with every infra permission and hand back a
/// non-expiring key for it. Only possible once.
pub async fn setup(ctx: &RequestContext) -> Result<SetupResponse, AppError> {
    let mut txn = ctx.begin().await?;

    if !db::settings::clear_setup_required(txn.conn()).await? {
        tracing::warn!("setup attempted after it was completed");
        return Err(AppError::forbidden());
    }

    let admin = db::identities::insert(
        txn.conn(),
        ADMIN_IDENTITY_NAME,
        IdentityKind::Machine,
        PERMISSION_ALL_INFRA,
    )
    .await?;

    let issued = access_keys::issue(
        txn.conn(),
        &CreateAccessKey {
            issued_for: admin.id,
            name: Some(ADMIN_IDENTITY_NAME.to_string()),
            ..Default::default()
        },
    )
    .await?;

    txn.commit().await?;
    tracing::info!(identity_id = admin.id, "setup completed");

    Ok(SetupResponse {
        name: admin.name,
        access_key: issued.raw,
    })
}
