//! Sliding-window rate limiting per client IP

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        limit: u32,
        remaining: u32,
    },
    Limited {
        limit: u32,
        /// Seconds until the oldest request leaves the window
        retry_after_secs: u64,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Request timestamps per client within the current window
#[derive(Debug)]
pub struct RateLimiter {
    requests: DashMap<IpAddr, Vec<Instant>>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            requests: DashMap::new(),
            window,
            max_requests,
        }
    }

    /// Check if a request is allowed and record it
    pub fn check_and_record(&self, client: IpAddr) -> RateDecision {
        self.check_and_record_at(client, Instant::now())
    }

    fn check_and_record_at(&self, client: IpAddr, now: Instant) -> RateDecision {
        let mut entry = self.requests.entry(client).or_default();

        entry.retain(|&ts| now.saturating_duration_since(ts) < self.window);

        if entry.len() >= self.max_requests as usize {
            let oldest = entry.first().copied().unwrap_or(now);
            let until_free = self
                .window
                .saturating_sub(now.saturating_duration_since(oldest));
            let retry_after_secs = until_free.as_secs() + u64::from(until_free.subsec_nanos() > 0);

            debug!(client = %client, retry_after_secs, "Rate limit exceeded");
            return RateDecision::Limited {
                limit: self.max_requests,
                retry_after_secs: retry_after_secs.max(1),
            };
        }

        entry.push(now);
        RateDecision::Allowed {
            limit: self.max_requests,
            remaining: self.max_requests - entry.len() as u32,
        }
    }

    /// Drop timestamps outside the window and forget idle clients
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.requests.retain(|_, requests| {
            requests.retain(|&ts| now.saturating_duration_since(ts) < self.window);
            !requests.is_empty()
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.requests.len()
    }
}

/// Spawn the periodic cleanup task
pub fn spawn_cleanup_task(
    limiter: Arc<RateLimiter>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            limiter.cleanup();
            debug!(clients = limiter.tracked_clients(), "Rate limiter cleanup");
        }
    })
}
