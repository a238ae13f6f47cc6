//! Health, version and informational endpoints
//!
//! - `/health` - liveness plus the storage dependency
//! - `/api/v1/version` - static build metadata
//! - `/api/v1/health/services` - every backend, probed concurrently
//! - `/functions/health` - storage self-test with a user count
//! - `/paramitas` - the six perfections the assessment measures

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::assessment::Paramita;
use crate::server::response::{json_response, now_rfc3339, success_response};
use crate::server::AppState;
use crate::services::AggregateHealth;

const SERVICE_NAME: &str = "paramita-gateway";

/// Storage dependency status
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Gateway liveness response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub environment: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub storage: StorageHealth,
    pub timestamp: String,
}

/// Build metadata
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub api_version: &'static str,
    pub environment: &'static str,
    pub commit: &'static str,
    pub build_time: &'static str,
    pub supported_services: Vec<String>,
    pub timestamp: String,
}

/// Backend health response
#[derive(Debug, Serialize)]
pub struct ServicesHealthResponse {
    #[serde(flatten)]
    pub health: AggregateHealth,
    pub timestamp: String,
}

async fn check_storage(state: &AppState, with_count: bool) -> StorageHealth {
    if let Err(e) = state.store.probe().await {
        warn!(error = %e, "Storage self-test failed");
        return StorageHealth {
            status: "unhealthy",
            user_count: None,
            error: state.args.dev_mode.then(|| e.to_string()),
        };
    }

    if !with_count {
        return StorageHealth {
            status: "healthy",
            user_count: None,
            error: None,
        };
    }

    match state.store.count().await {
        Ok(count) => StorageHealth {
            status: "healthy",
            user_count: Some(count),
            error: None,
        },
        Err(e) => {
            warn!(error = %e, "Failed to count user records");
            StorageHealth {
                status: "unhealthy",
                user_count: None,
                error: state.args.dev_mode.then(|| e.to_string()),
            }
        }
    }
}

/// Liveness probe: 200 when the gateway and its storage work, 503 otherwise
pub async fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let storage = check_storage(state, false).await;
    let healthy = storage.status == "healthy";

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        environment: state.args.environment(),
        uptime: state.started_at.elapsed().as_secs(),
        storage,
        timestamp: now_rfc3339(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, &response)
}

/// Version info for deployment verification
pub fn version_info(state: &AppState) -> Response<Full<Bytes>> {
    let response = VersionResponse {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        api_version: "v1",
        environment: state.args.environment(),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        supported_services: state.health.service_names(),
        timestamp: now_rfc3339(),
    };
    json_response(StatusCode::OK, &response)
}

/// Probe all backends: 200 when all are healthy, 503 when degraded
pub async fn services_health(state: &AppState) -> Response<Full<Bytes>> {
    let health = state.health.check_all().await;
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    json_response(
        status,
        &ServicesHealthResponse {
            health,
            timestamp: now_rfc3339(),
        },
    )
}

/// Storage self-test for the function endpoints
pub async fn storage_health(state: &AppState) -> Response<Full<Bytes>> {
    let storage = check_storage(state, true).await;
    let healthy = storage.status == "healthy";

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    // success reports that the check itself ran
    success_response(
        status,
        serde_json::json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "environment": state.args.environment(),
            "storage": storage,
        }),
    )
}

/// The six perfections
pub fn paramitas_info() -> Response<Full<Bytes>> {
    let paramitas: Vec<_> = Paramita::ALL
        .iter()
        .map(|p| serde_json::json!({ "key": p.as_str(), "name": p.english() }))
        .collect();

    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "title": "Six Perfections",
            "description": "The Buddhist path to enlightenment through six perfections",
            "paramitas": paramitas,
        }),
    )
}
