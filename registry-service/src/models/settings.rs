//! Process-wide settings singleton.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, FromRow)]
pub struct Settings {
    pub id: i64,
    /// Sealed PKCS#8 Ed25519 signing key.
    pub private_key: String,
    /// Public half as a JSON Web Key.
    pub public_jwk: String,
    pub length_min: i64,
    pub lowercase_min: i64,
    pub uppercase_min: i64,
    pub number_min: i64,
    pub symbol_min: i64,
    pub setup_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Settings {
    pub fn password_policy(&self) -> PasswordPolicy {
        PasswordPolicy {
            length_min: self.length_min as u32,
            lowercase_min: self.lowercase_min as u32,
            uppercase_min: self.uppercase_min as u32,
            number_min: self.number_min as u32,
            symbol_min: self.symbol_min as u32,
        }
    }
}

/// Minimum counts per character class. Zero disables a class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PasswordPolicy {
    #[validate(range(max = 1024))]
    pub length_min: u32,
    #[validate(range(max = 1024))]
    pub lowercase_min: u32,
    #[validate(range(max = 1024))]
    pub uppercase_min: u32,
    #[validate(range(max = 1024))]
    pub number_min: u32,
    #[validate(range(max = 1024))]
    pub symbol_min: u32,
}
