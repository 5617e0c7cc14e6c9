pub mod auth_api;
pub mod local_api;

pub use auth_api::{ApiConfig, AuthApi, HttpAuthApi};
pub use local_api::LocalApi;
