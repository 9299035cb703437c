//! Access key model - bearer secrets bound to an identity.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Scope granted to keys issued for a one-time password reset.
pub const SCOPE_PASSWORD_RESET: &str = "password-reset";

/// Access key entity. Only a digest of the secret is ever stored.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct AccessKey {
    pub id: i64,
    pub key_id: String,
    pub secret_hash: Vec<u8>,
    pub name: String,
    pub issued_for: i64,
    /// Space separated scope list.
    pub scopes: String,
    pub expires_at: DateTime<Utc>,
    pub extension_deadline: Option<DateTime<Utc>>,
    pub extension_seconds: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl AccessKey {
    pub fn scopes(&self) -> Vec<String> {
        self.scopes.split_whitespace().map(str::to_string).collect()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.split_whitespace().any(|s| s == scope)
    }

    pub fn set_scopes<I, S>(&mut self, scopes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.scopes = join_scopes(scopes);
    }

    /// Remove `scope`, returning whether it was present.
    pub fn remove_scope(&mut self, scope: &str) -> bool {
        if !self.has_scope(scope) {
            return false;
        }
        let kept: Vec<String> = self.scopes().into_iter().filter(|s| s != scope).collect();
        self.set_scopes(kept);
        true
    }

    /// A key is usable strictly before its expiry and, when set, strictly
    /// before its extension deadline.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        if now >= self.expires_at {
            return false;
        }
        match self.extension_deadline {
            Some(deadline) => now < deadline,
            None => true,
        }
    }

    pub fn extension(&self) -> Option<Duration> {
        self.extension_seconds.and_then(Duration::try_seconds)
    }

    /// Deadline after a successful use: `now + extension`, capped at expiry.
    pub fn renewed_deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.extension().map(|ext| {
            now.checked_add_signed(ext)
                .map_or(self.expires_at, |deadline| deadline.min(self.expires_at))
        })
    }
}

pub fn join_scopes<I, S>(scopes: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for scope in scopes {
        let scope = scope.as_ref().trim();
        if !scope.is_empty() && !out.iter().any(|s| s == scope) {
            out.push(scope.to_string());
        }
    }
    out.join(" ")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyResponse {
    pub id: i64,
    pub name: String,
    pub issued_for: i64,
    pub scopes: Vec<String>,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub extension_deadline: Option<DateTime<Utc>>,
}

impl From<AccessKey> for AccessKeyResponse {
    fn from(k: AccessKey) -> Self {
        Self {
            id: k.id,
            scopes: k.scopes(),
            name: k.name,
            issued_for: k.issued_for,
            created: k.created_at,
            expires: k.expires_at,
            extension_deadline: k.extension_deadline,
        }
    }
}
