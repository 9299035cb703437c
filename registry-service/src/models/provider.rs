//! External identity provider configuration and per-identity OAuth tokens.
//!
//! Secret columns hold sealed values (see `services::encryption::DataKey`).

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Tokens expiring within this window are refreshed before use.
pub const REFRESH_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, FromRow)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub client_id: String,
    /// Sealed client secret.
    pub client_secret: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ProviderToken {
    pub id: i64,
    pub identity_id: i64,
    pub provider_id: i64,
    /// Sealed access token.
    pub access_token: String,
    /// Sealed refresh token.
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl ProviderToken {
    pub fn refresh_due(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_SKEW_SECONDS) >= self.expires_at
    }
}

/// Provider as returned to clients. The client secret is never included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub client_id: String,
    pub created: DateTime<Utc>,
}

impl From<Provider> for ProviderResponse {
    fn from(p: Provider) -> Self {
        Self {
            id: p.id,
            name: p.name,
            url: p.url,
            client_id: p.client_id,
            created: p.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: DateTime<Utc>) -> ProviderToken {
        ProviderToken {
            id: 1,
            identity_id: 1,
            provider_id: 1,
            access_token: String::new(),
            refresh_token: String::new(),
            expires_at,
        }
    }

    #[test]
    fn refresh_due_inside_skew_window() {
        let now = Utc::now();
        assert!(token(now).refresh_due(now));
        assert!(token(now + Duration::seconds(30)).refresh_due(now));
        assert!(!token(now + Duration::minutes(10)).refresh_due(now));
    }
}
