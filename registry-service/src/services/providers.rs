//! Identity provider configuration and per-identity OAuth tokens, sealed at rest.

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::sync::Arc;

use crate::db;
use crate::models::Provider;
use crate::services::authz::{self, Operation, Role};
use crate::services::context::RequestContext;
use crate::services::encryption::DataKey;

#[derive(Debug, Clone)]
pub struct NewProvider {
    pub name: String,
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Decrypted provider tokens for the caller.
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_due: bool,
}

#[derive(Debug, Clone)]
pub struct ProviderService {
    data_key: Arc<DataKey>,
}

impl ProviderService {
    pub fn new(data_key: Arc<DataKey>) -> Self {
        Self { data_key }
    }

    pub async fn create_provider(
        &self,
        ctx: &RequestContext,
        req: &NewProvider,
    ) -> Result<Provider, AppError> {
        if req.name.trim().is_empty() || req.url.trim().is_empty() || req.client_id.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "name, url and clientID are required"
            )));
        }

        let sealed = self.data_key.seal_str(&req.client_secret)?;
        let mut txn = authz::require_role(ctx, Role::Admin).await?;
        let provider =
            db::providers::insert(txn.conn(), req.name.trim(), &req.url, &req.client_id, &sealed)
                .await?;
        txn.commit().await?;

        tracing::info!(provider_id = provider.id, "provider created");
        Ok(provider)
    }

    pub async fn list_providers(&self, ctx: &RequestContext) -> Result<Vec<Provider>, AppError> {
        let mut txn = authz::require_role(ctx, Role::View).await?;
        let providers = db::providers::list(txn.conn()).await?;
        txn.commit().await?;
        Ok(providers)
    }

    pub async fn delete_provider(&self, ctx: &RequestContext, id: i64) -> Result<(), AppError> {
        let mut txn = authz::require_role(ctx, Role::Admin).await?;
        db::providers::delete(txn.conn(), id).await?;
        txn.commit().await?;

        tracing::info!(provider_id = id, "provider deleted");
        Ok(())
    }

    /// Plaintext client secret, for the token exchange with the provider.
    pub async fn client_secret(&self, ctx: &RequestContext, id: i64) -> Result<String, AppError> {
        let mut txn = authz::require_role(ctx, Role::Admin).await?;
        let provider = db::providers::get(txn.conn(), id).await?;
        txn.commit().await?;
        Ok(self.data_key.open_str(&provider.client_secret)?)
    }

    /// Store the caller's tokens for `provider_id`, replacing earlier ones.
    pub async fn store_tokens(
        &self,
        ctx: &RequestContext,
        provider_id: i64,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let identity_id = caller_id(ctx)?;
        let sealed_access = self.data_key.seal_str(access_token)?;
        let sealed_refresh = self.data_key.seal_str(refresh_token)?;

        let (mut txn, _) =
            authz::authorize(ctx, Operation::ManageProviderTokens, identity_id).await?;
        db::providers::get(txn.conn(), provider_id).await?;
        db::providers::upsert_token(
            txn.conn(),
            identity_id,
            provider_id,
            &sealed_access,
            &sealed_refresh,
            expires_at,
        )
        .await?;
        txn.commit().await?;
        Ok(())
    }

    pub async fn tokens(
        &self,
        ctx: &RequestContext,
        provider_id: i64,
    ) -> Result<ProviderTokens, AppError> {
        let identity_id = caller_id(ctx)?;
        let (mut txn, _) =
            authz::authorize(ctx, Operation::ManageProviderTokens, identity_id).await?;
        let token = db::providers::find_token(txn.conn(), identity_id, provider_id)
            .await?
            .ok_or_else(|| AppError::not_found("provider token"))?;
        txn.commit().await?;

        Ok(ProviderTokens {
            access_token: self.data_key.open_str(&token.access_token)?,
            refresh_token: self.data_key.open_str(&token.refresh_token)?,
            expires_at: token.expires_at,
            refresh_due: token.refresh_due(Utc::now()),
        })
    }
}

fn caller_id(ctx: &RequestContext) -> Result<i64, AppError> {
    ctx.principal()
        .map(|p| p.identity_id())
        .ok_or_else(|| AppError::unauthorized("authentication required"))
}
