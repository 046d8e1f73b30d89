//! SQLite storage layer.
//!
//! Audit and health persistence backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod audit;
pub mod execution_log;
pub mod pool;
pub mod provider_health;
