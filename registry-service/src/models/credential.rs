use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Password credential of an identity. At most one per identity.
///
/// `one_time_password` is set for admin-issued passwords and cleared once
/// the owner sets a password themselves.
#[derive(Debug, Clone, FromRow)]
pub struct Credential {
    pub id: i64,
    pub identity_id: i64,
    pub password_hash: String,
    pub one_time_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
