//! Persistent entities of the registry.

pub mod access_key;
pub mod credential;
pub mod encryption_key;
pub mod grant;
pub mod group;
pub mod identity;
pub mod provider;
pub mod settings;

pub use access_key::{AccessKey, AccessKeyResponse, SCOPE_PASSWORD_RESET};
pub use credential::Credential;
pub use encryption_key::EncryptionKey;
pub use grant::{Grant, GrantResponse, Subject};
pub use group::{Group, GroupResponse};
pub use identity::{Identity, IdentityKind, IdentityResponse};
pub use provider::{Provider, ProviderResponse, ProviderToken};
pub use settings::{PasswordPolicy, Settings};
