//! HTTP routes for the gateway

pub mod api;
pub mod functions;
pub mod health;

pub use api::handle_api_request;
pub use functions::handle_auth_function;
pub use health::{health_check, paramitas_info, services_health, storage_health, version_info};
