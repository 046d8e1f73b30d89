//! HTTP request handlers for the REST API.

pub mod analytics;
pub mod audit;
pub mod execute;
pub mod health;
pub mod providers;
pub mod routing;
