//! Password credentials: one-time issuing and updates.

use service_core::error::{AppError, FieldErrors};
use sqlx::SqliteConnection;

use crate::db;
use crate::models::SCOPE_PASSWORD_RESET;
use crate::services::authz::{self, Operation, Role};
use crate::services::context::RequestContext;
use crate::services::password_policy::{self, BadPasswordList};
use crate::utils::password::{hash_password_blocking, verify_password_blocking};
use crate::utils::{random_string, Password, PasswordHashString, PASSWORD_CHARSET};

pub const TEMPORARY_PASSWORD_LEN: usize = 12;
pub const OLD_PASSWORD_FIELD: &str = "oldPassword";

/// A freshly generated one-time password and its hash.
///
/// Built before any transaction is opened so the hash never runs while the
/// database is held.
pub struct TemporaryPassword {
    plaintext: String,
    hash: PasswordHashString,
}

impl TemporaryPassword {
    pub async fn generate() -> Result<Self, AppError> {
        let plaintext = random_string(TEMPORARY_PASSWORD_LEN, PASSWORD_CHARSET);
        let hash = hash_password_blocking(Password::new(plaintext.clone())).await?;
        Ok(Self { plaintext, hash })
    }

    pub fn into_plaintext(self) -> String {
        self.plaintext
    }
}

/// Store `password` as the one-time credential of `identity_id`, replacing
/// any existing one. No role check.
pub async fn store_temporary_in(
    conn: &mut SqliteConnection,
    identity_id: i64,
    password: &TemporaryPassword,
) -> Result<(), AppError> {
    db::identities::get(conn, identity_id).await?;

    match db::credentials::find_for_identity(conn, identity_id).await? {
        Some(_) => db::credentials::update(conn, identity_id, password.hash.as_str(), true).await?,
        None => db::credentials::insert(conn, identity_id, password.hash.as_str(), true).await?,
    }

    tracing::info!(identity_id, "temporary credential issued");
    Ok(())
}

fn invalid_old_password() -> AppError {
    AppError::Validation(FieldErrors::single(OLD_PASSWORD_FIELD, "invalid oldPassword"))
}

#[derive(Clone, Debug, Default)]
pub struct CredentialService {
    bad_passwords: BadPasswordList,
}

impl CredentialService {
    pub fn new(bad_passwords: BadPasswordList) -> Self {
        Self { bad_passwords }
    }

    /// Admin: give `identity_id` a fresh one-time password and return it.
    /// An existing credential is replaced.
    pub async fn issue_temporary_credential(
        &self,
        ctx: &RequestContext,
        identity_id: i64,
    ) -> Result<String, AppError> {
        // reject non-admins before paying for a hash
        authz::require_role(ctx, Role::Admin).await?.commit().await?;
        let password = TemporaryPassword::generate().await?;

        let mut txn = authz::require_role(ctx, Role::Admin).await?;
        store_temporary_in(txn.conn(), identity_id, &password).await?;
        txn.commit().await?;
        Ok(password.into_plaintext())
    }

    /// Set a new password for `identity_id`.
    ///
    /// Acting on oneself requires the current password and clears the
    /// one-time flag; acting on others requires admin and sets it. Hashing
    /// happens between two short transactions; a credential that changed in
    /// between fails like a wrong old password.
    pub async fn update_credential(
        &self,
        ctx: &RequestContext,
        identity_id: i64,
        old_password: Option<&str>,
        new_password: &str,
    ) -> Result<(), AppError> {
        let (mut txn, decision) =
            authz::authorize(ctx, Operation::UpdateCredential, identity_id).await?;
        let is_self = decision.is_self();
        db::identities::get(txn.conn(), identity_id).await?;
        let seen_hash = db::credentials::find_for_identity(txn.conn(), identity_id)
            .await?
            .map(|c| c.password_hash);
        let policy = db::settings::get(txn.conn()).await?.password_policy();
        txn.commit().await?;

        if is_self {
            let old = old_password
                .filter(|p| !p.is_empty())
                .ok_or_else(|| {
                    AppError::Validation(FieldErrors::single(OLD_PASSWORD_FIELD, "is required"))
                })?;
            let stored = seen_hash.clone().ok_or_else(invalid_old_password)?;
            let matches =
                verify_password_blocking(Password::new(old), PasswordHashString::new(stored))
                    .await?;
            if !matches {
                tracing::debug!(identity_id, "old password mismatch");
                return Err(invalid_old_password());
            }
        }

        password_policy::check_password(&policy, new_password)?;
        self.bad_passwords.check(new_password).await?;
        let hash = hash_password_blocking(Password::new(new_password)).await?;

        let (mut txn, _) =
            authz::authorize(ctx, Operation::UpdateCredential, identity_id).await?;
        let current = db::credentials::find_for_identity(txn.conn(), identity_id).await?;
        if is_self && current.as_ref().map(|c| &c.password_hash) != seen_hash.as_ref() {
            tracing::debug!(identity_id, "credential changed during update");
            return Err(invalid_old_password());
        }

        match current {
            Some(_) => {
                db::credentials::update(txn.conn(), identity_id, hash.as_str(), !is_self).await?
            }
            None => db::credentials::insert(txn.conn(), identity_id, hash.as_str(), true).await?,
        }

        if is_self {
            let key = txn
                .principal()
                .and_then(|p| p.access_key.clone())
                .filter(|k| k.has_scope(SCOPE_PASSWORD_RESET));
            if let Some(mut key) = key {
                key.remove_scope(SCOPE_PASSWORD_RESET);
                db::access_keys::update_scopes(txn.conn(), key.id, &key.scopes).await?;
                tracing::info!(access_key_id = key.id, "password reset scope removed");
            }
        }

        txn.commit().await?;
        tracing::info!(identity_id, is_self, "credential updated");
        Ok(())
    }
}
