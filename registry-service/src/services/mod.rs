//! Registry operations. Each takes a `RequestContext` and runs in one
//! transaction.

pub mod access_keys;
pub mod authz;
pub mod context;
pub mod credentials;
pub mod encryption;
pub mod grants;
pub mod identities;
pub mod password_policy;
pub mod providers;
pub mod settings;
pub mod setup;
pub mod tokens;

pub use authz::{Decision, Operation, Role};
pub use context::{Principal, RequestContext, Txn};
pub use credentials::CredentialService;
pub use encryption::{DataKey, NativeKeyProvider, RootKeyProvider};
pub use providers::ProviderService;
pub use tokens::TokenService;
