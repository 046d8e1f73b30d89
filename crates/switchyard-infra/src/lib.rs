//! Infrastructure layer for Switchyard.
//!
//! Contains the IO-facing pieces around the `switchyard-core` engine:
//! TOML configuration loading, the SQLite execution audit log and provider
//! health persistence, and a simulated provider backend for demos.

pub mod config;
pub mod simulated;
pub mod sqlite;
