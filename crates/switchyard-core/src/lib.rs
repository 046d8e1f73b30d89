//! Core orchestration logic for Switchyard.
//!
//! Rate governance, health tracking, provider ranking, fallback-chain
//! execution and analytics. Depends only on `switchyard-types`; concrete
//! providers, persistence and transports live in the outer crates.

pub mod analytics;
pub mod balancer;
pub mod clock;
pub mod event;
pub mod health;
pub mod orchestrator;
pub mod provider;
pub mod rate_limiter;
pub mod routing;

pub use analytics::AnalyticsAggregator;
pub use balancer::LoadBalancer;
pub use health::HealthMonitor;
pub use orchestrator::Orchestrator;
pub use rate_limiter::RateLimiter;
