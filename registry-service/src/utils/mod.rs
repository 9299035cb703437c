pub mod password;
pub mod random;

pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use random::{random_string, ALPHANUMERIC, PASSWORD_CHARSET};
