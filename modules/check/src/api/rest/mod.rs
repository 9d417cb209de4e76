pub mod auth;
pub mod error;
pub mod routes;

pub use auth::{ApiAuth, Caller};
pub use routes::{AppState, router};
