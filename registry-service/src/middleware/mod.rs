pub mod auth;

pub use auth::{context_middleware, Ctx};
