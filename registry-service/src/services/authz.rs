//! Grant evaluation and the capability check every privileged operation uses.
//!
//! Roles are privileges on the `infra` resource. `admin` implies `connector`
//! and `view`; the other two imply only themselves. An identity carrying the
//! `infra:*` permission holds every role.

use service_core::error::AppError;
use sqlx::SqliteConnection;
use std::fmt;

use crate::db;
use crate::models::Identity;
use crate::services::context::{Principal, RequestContext, Txn};

pub const RESOURCE_INFRA: &str = "infra";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Connector,
    View,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Connector => "connector",
            Role::View => "view",
        }
    }

    /// Whether a grant of `held` satisfies a requirement for `self`.
    pub fn satisfied_by(&self, held: Role) -> bool {
        held == *self || held == Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "connector" => Ok(Role::Connector),
            "view" => Ok(Role::View),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// Whether the identity holds `role`, directly or through a group.
pub async fn has_role(
    conn: &mut SqliteConnection,
    identity: &Identity,
    role: Role,
) -> Result<bool, AppError> {
    if identity.has_all_infra_permissions() {
        return Ok(true);
    }

    let privileges = db::grants::effective_privileges(conn, identity.id, RESOURCE_INFRA).await?;
    Ok(privileges
        .iter()
        .filter_map(|p| p.parse::<Role>().ok())
        .any(|held| role.satisfied_by(held)))
}

/// Check the transaction's principal for `role`.
pub async fn is_authorized(txn: &mut Txn, role: Role) -> Result<(), AppError> {
    let principal = txn.require_principal()?.clone();
    if principal.is_password_reset_only() {
        tracing::debug!(identity_id = principal.identity_id(), "password reset key used for role check");
        return Err(AppError::forbidden());
    }

    if has_role(txn.conn(), &principal.identity, role).await? {
        Ok(())
    } else {
        tracing::debug!(
            identity_id = principal.identity_id(),
            role = %role,
            "role check denied"
        );
        Err(AppError::forbidden())
    }
}

/// Open a transaction for the request and require `role` of its principal.
pub async fn require_role(ctx: &RequestContext, role: Role) -> Result<Txn, AppError> {
    let mut txn = ctx.begin().await?;
    is_authorized(&mut txn, role).await?;
    Ok(txn)
}

/// Operations whose permission depends on whether the caller acts on itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ReadIdentity,
    UpdateCredential,
    ManageAccessKeys,
    Logout,
    CreateToken,
    ReadGrants,
    ManageProviderTokens,
}

impl Operation {
    /// Role needed to perform this operation on somebody else.
    pub fn role_for_others(&self) -> Role {
        match self {
            Operation::ReadIdentity => Role::View,
            _ => Role::Admin,
        }
    }

    /// Operations a password reset key may still perform on its owner.
    fn allowed_during_password_reset(&self) -> bool {
        matches!(
            self,
            Operation::ReadIdentity | Operation::UpdateCredential | Operation::Logout
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The caller acts on itself.
    AllowSelf,
    /// The caller acts on someone else and holds the required role.
    AllowRole,
    Deny,
}

impl Decision {
    pub fn is_self(&self) -> bool {
        *self == Decision::AllowSelf
    }
}

/// Decide whether `principal` may perform `op` on the identity `target`.
pub async fn decide(
    conn: &mut SqliteConnection,
    principal: &Principal,
    op: Operation,
    target: i64,
) -> Result<Decision, AppError> {
    let reset_only = principal.is_password_reset_only();

    if principal.identity_id() == target {
        if reset_only && !op.allowed_during_password_reset() {
            return Ok(Decision::Deny);
        }
        return Ok(Decision::AllowSelf);
    }

    if reset_only {
        return Ok(Decision::Deny);
    }

    if has_role(conn, &principal.identity, op.role_for_others()).await? {
        Ok(Decision::AllowRole)
    } else {
        Ok(Decision::Deny)
    }
}

/// `decide` inside an existing transaction, mapping `Deny` to `Forbidden`.
pub async fn authorize_in(
    txn: &mut Txn,
    op: Operation,
    target: i64,
) -> Result<Decision, AppError> {
    let principal = txn.require_principal()?.clone();
    let decision = decide(txn.conn(), &principal, op, target).await?;
    if decision == Decision::Deny {
        tracing::debug!(
            identity_id = principal.identity_id(),
            target,
            operation = ?op,
            "capability check denied"
        );
        return Err(AppError::forbidden());
    }
    Ok(decision)
}

/// Open a transaction and authorize `op` on `target`.
pub async fn authorize(
    ctx: &RequestContext,
    op: Operation,
    target: i64,
) -> Result<(Txn, Decision), AppError> {
    let mut txn = ctx.begin().await?;
    let decision = authorize_in(&mut txn, op, target).await?;
    Ok((txn, decision))
}
