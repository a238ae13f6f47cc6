//! Paramita Gateway - API gateway for the Six Perfections assessment platform
//!
//! Sits between the browser frontend and the backend microservices:
//!
//! - **Routing**: `/api/v1/*` prefixes are forwarded to the owning service
//! - **Authentication**: bearer tokens are verified and resolved to stored users
//! - **Authorization**: research and admin prefixes require a role
//! - **Health**: backend health probes aggregated into one status
//! - **Rate limiting**: sliding window per client IP over `/api/*`
//! - **Functions**: registration, login and assessment scoring served in-process

pub mod assessment;
pub mod auth;
pub mod config;
pub mod logging;
pub mod proxy;
pub mod routes;
pub mod server;
pub mod services;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GatewayError, Result};
