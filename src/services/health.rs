//! Backend health aggregation
//!
//! Probes `GET <base>/health` on every configured backend at once, each probe
//! bounded by its own timeout, and reduces the results: the aggregate is
//! healthy only when every backend is.

use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::proxy::BackendTarget;
use crate::types::GatewayError;

/// Status of one backend or of the whole set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

/// Probe result for one backend
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub status: HealthStatus,
    /// Backend-reported `X-Response-Time`, or measured latency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time: None,
            version: None,
            error: Some(error.into()),
        }
    }
}

/// Result of probing every backend
#[derive(Debug, Clone, Serialize)]
pub struct AggregateHealth {
    pub status: HealthStatus,
    pub services: BTreeMap<String, ServiceHealth>,
}

impl AggregateHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Concurrent health prober
#[derive(Debug, Clone)]
pub struct HealthAggregator {
    client: reqwest::Client,
    targets: Vec<BackendTarget>,
    probe_timeout: Duration,
}

impl HealthAggregator {
    pub fn new(targets: Vec<BackendTarget>, probe_timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(probe_timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            targets,
            probe_timeout,
        })
    }

    pub fn service_names(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name.clone()).collect()
    }

    /// Probe every backend. Never fails; unreachable backends are reported unhealthy.
    pub async fn check_all(&self) -> AggregateHealth {
        let probes = self.targets.iter().map(|target| async move {
            let health = self.probe(target).await;
            (target.name.clone(), health)
        });

        let services: BTreeMap<String, ServiceHealth> = join_all(probes).await.into_iter().collect();

        let status = if services
            .values()
            .all(|s| s.status == HealthStatus::Healthy)
        {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        debug!(status = ?status, services = services.len(), "Backend health aggregated");
        AggregateHealth { status, services }
    }

    async fn probe(&self, target: &BackendTarget) -> ServiceHealth {
        let url = format!("{}/health", target.base_url);
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.probe_timeout, async {
            let response = self.client.get(&url).send().await?;
            let status = response.status();
            let reported_time = response
                .headers()
                .get("x-response-time")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.json::<serde_json::Value>().await.ok();
            Ok::<_, reqwest::Error>((status, reported_time, body))
        })
        .await;

        match outcome {
            Ok(Ok((status, reported_time, body))) if status.is_success() => ServiceHealth {
                status: HealthStatus::Healthy,
                response_time: Some(
                    reported_time
                        .unwrap_or_else(|| format!("{}ms", started.elapsed().as_millis())),
                ),
                version: body
                    .as_ref()
                    .and_then(|v| v.get("version"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                error: None,
            },
            Ok(Ok((status, _, _))) => {
                warn!(service = %target.name, status = status.as_u16(), "Health probe returned error status");
                ServiceHealth::unhealthy(format!("health endpoint returned {status}"))
            }
            Ok(Err(e)) => {
                warn!(service = %target.name, error = %e, "Health probe failed");
                ServiceHealth::unhealthy(e.to_string())
            }
            Err(_) => {
                warn!(service = %target.name, timeout_ms = self.probe_timeout.as_millis() as u64, "Health probe timed out");
                ServiceHealth::unhealthy(format!(
                    "timed out after {}ms",
                    self.probe_timeout.as_millis()
                ))
            }
        }
    }
}
