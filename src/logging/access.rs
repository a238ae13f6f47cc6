//! Per-request access log
//!
//! Built up while a request is handled and emitted once as a single tracing
//! event under the `access` target, so it can be filtered independently.

use std::net::IpAddr;
use std::time::Duration;
use tracing::{info, warn};

/// One completed request
#[derive(Debug, Clone)]
pub struct AccessEvent {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration: Duration,
    pub client_ip: IpAddr,
    pub request_id: String,
    /// Authenticated user, when the route resolved one
    pub user_id: Option<String>,
    /// Backend the request was forwarded to
    pub service: Option<String>,
}

impl AccessEvent {
    pub fn new(method: &str, path: &str, client_ip: IpAddr, request_id: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            status: 0,
            duration: Duration::ZERO,
            client_ip,
            request_id: request_id.to_string(),
            user_id: None,
            service: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_service(mut self, service: Option<String>) -> Self {
        self.service = service;
        self
    }

    /// Write the event; server errors are logged at warn
    pub fn emit(&self) {
        let duration_ms = self.duration.as_secs_f64() * 1000.0;
        let user_id = self.user_id.as_deref().unwrap_or("-");
        let service = self.service.as_deref().unwrap_or("-");

        if self.status >= 500 {
            warn!(
                target: "access",
                method = %self.method,
                path = %self.path,
                status = self.status,
                duration_ms,
                client_ip = %self.client_ip,
                request_id = %self.request_id,
                user_id,
                service,
                "request"
            );
        } else {
            info!(
                target: "access",
                method = %self.method,
                path = %self.path,
                status = self.status,
                duration_ms,
                client_ip = %self.client_ip,
                request_id = %self.request_id,
                user_id,
                service,
                "request"
            );
        }
    }
}
