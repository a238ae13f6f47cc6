//! Background and cross-cutting services

pub mod health;
pub mod rate_limit;

pub use health::{AggregateHealth, HealthAggregator, HealthStatus, ServiceHealth};
pub use rate_limit::{spawn_cleanup_task, RateDecision, RateLimiter};
