//! Identity model - user and machine principals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Subject;

/// Permission string carried by bootstrap machine identities.
pub const PERMISSION_ALL_INFRA: &str = "infra:*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    User,
    Machine,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::User => "user",
            IdentityKind::Machine => "machine",
        }
    }
}

impl std::str::FromStr for IdentityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(IdentityKind::User),
            "machine" => Ok(IdentityKind::Machine),
            _ => Err(format!("invalid identity kind: {}", s)),
        }
    }
}

/// Identity entity. Never hard-deleted; `deleted_at` marks removal.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Identity {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub permissions: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn subject(&self) -> Subject {
        Subject::Identity(self.id)
    }

    pub fn kind(&self) -> Option<IdentityKind> {
        self.kind.parse().ok()
    }

    /// Machine identities created by setup hold every infra role.
    pub fn has_all_infra_permissions(&self) -> bool {
        self.permissions
            .split_whitespace()
            .any(|p| p == PERMISSION_ALL_INFRA)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl From<Identity> for IdentityResponse {
    fn from(i: Identity) -> Self {
        Self {
            id: i.id,
            name: i.name,
            kind: i.kind,
            created: i.created_at,
            updated: i.updated_at,
        }
    }
}
