//! HTTP server and response plumbing

pub mod http;
pub mod response;

pub use http::{handle_request, not_found, run, AppState};
pub use response::{BoxBody, RequestContext};
