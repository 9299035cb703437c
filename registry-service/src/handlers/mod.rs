pub mod access_keys;
pub mod credentials;
pub mod grants;
pub mod groups;
pub mod identities;
pub mod providers;
pub mod settings;
pub mod setup;
pub mod tokens;
pub mod well_known;
