use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Envelope record: a data key wrapped by a root key.
#[derive(Debug, Clone, FromRow)]
pub struct EncryptionKey {
    pub id: i64,
    pub name: String,
    pub encrypted: Vec<u8>,
    pub algorithm: String,
    pub root_key_id: String,
    pub created_at: DateTime<Utc>,
}
