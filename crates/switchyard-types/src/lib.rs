//! Shared domain types for Switchyard.
//!
//! This crate contains the data shapes used across the orchestrator:
//! provider configuration and rate windows, operation requests, health
//! states, execution records, orchestrator events, analytics outputs,
//! and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod analytics;
pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod operation;
pub mod provider;
pub mod record;
