//! SQLite provider health persistence.
//!
//! Persists health snapshots across restarts so that a provider known to be
//! down is not trusted blindly when the process comes back.

use chrono::Utc;
use sqlx::Row;
use switchyard_types::error::RepositoryError;
use switchyard_types::health::{HealthSnapshot, HealthState};

use super::execution_log::{format_datetime, parse_datetime};
use super::pool::DatabasePool;

/// SQLite-backed provider health persistence.
#[derive(Clone)]
pub struct SqliteProviderHealthStore {
    pool: DatabasePool,
}

impl SqliteProviderHealthStore {
    /// Create a new provider health store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Save (upsert) a provider's health snapshot.
    pub async fn save(&self, snapshot: &HealthSnapshot) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO provider_health (name, state, avg_latency_ms, last_probe_at, consecutive_failures, consecutive_successes, recent_success_rate, total_calls, total_failures, last_error, uptime_since, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (name) DO UPDATE SET
                   state = excluded.state,
                   avg_latency_ms = excluded.avg_latency_ms,
                   last_probe_at = excluded.last_probe_at,
                   consecutive_failures = excluded.consecutive_failures,
                   consecutive_successes = excluded.consecutive_successes,
                   recent_success_rate = excluded.recent_success_rate,
                   total_calls = excluded.total_calls,
                   total_failures = excluded.total_failures,
                   last_error = excluded.last_error,
                   uptime_since = excluded.uptime_since,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&snapshot.provider)
        .bind(snapshot.state.to_string())
        .bind(snapshot.avg_latency_ms)
        .bind(snapshot.last_probe_at.as_ref().map(format_datetime))
        .bind(i64::from(snapshot.consecutive_failures))
        .bind(i64::from(snapshot.consecutive_successes))
        .bind(snapshot.recent_success_rate)
        .bind(snapshot.total_calls as i64)
        .bind(snapshot.total_failures as i64)
        .bind(&snapshot.last_error)
        .bind(snapshot.uptime_since.as_ref().map(format_datetime))
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    /// Save every snapshot, returning how many were written.
    pub async fn save_all(&self, snapshots: &[HealthSnapshot]) -> Result<usize, RepositoryError> {
        for snapshot in snapshots {
            self.save(snapshot).await?;
        }
        Ok(snapshots.len())
    }

    /// Load a single provider's persisted health snapshot.
    pub async fn load(&self, name: &str) -> Result<Option<HealthSnapshot>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM provider_health WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let health_row =
                    HealthSqlRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(health_row.into_snapshot()?))
            }
            None => Ok(None),
        }
    }

    /// Load all persisted snapshots, by provider name.
    pub async fn load_all(&self) -> Result<Vec<HealthSnapshot>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM provider_health ORDER BY name")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let health_row =
                HealthSqlRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            results.push(health_row.into_snapshot()?);
        }

        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Private Row types
// ---------------------------------------------------------------------------

struct HealthSqlRow {
    name: String,
    state: String,
    avg_latency_ms: Option<f64>,
    last_probe_at: Option<String>,
    consecutive_failures: i64,
    consecutive_successes: i64,
    recent_success_rate: f64,
    total_calls: i64,
    total_failures: i64,
    last_error: Option<String>,
    uptime_since: Option<String>,
}

impl HealthSqlRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            name: row.try_get("name")?,
            state: row.try_get("state")?,
            avg_latency_ms: row.try_get("avg_latency_ms")?,
            last_probe_at: row.try_get("last_probe_at")?,
            consecutive_failures: row.try_get("consecutive_failures")?,
            consecutive_successes: row.try_get("consecutive_successes")?,
            recent_success_rate: row.try_get("recent_success_rate")?,
            total_calls: row.try_get("total_calls")?,
            total_failures: row.try_get("total_failures")?,
            last_error: row.try_get("last_error")?,
            uptime_since: row.try_get("uptime_since")?,
        })
    }

    fn into_snapshot(self) -> Result<HealthSnapshot, RepositoryError> {
        let state: HealthState = self.state.parse().map_err(RepositoryError::Query)?;
        let last_probe_at = self.last_probe_at.as_deref().map(parse_datetime).transpose()?;
        let uptime_since = self.uptime_since.as_deref().map(parse_datetime).transpose()?;

        Ok(HealthSnapshot {
            provider: self.name,
            state,
            avg_latency_ms: self.avg_latency_ms,
            last_probe_at,
            consecutive_failures: self.consecutive_failures as u32,
            consecutive_successes: self.consecutive_successes as u32,
            recent_success_rate: self.recent_success_rate,
            total_calls: self.total_calls as u64,
            total_failures: self.total_failures as u64,
            last_error: self.last_error,
            uptime_since,
        })
    }
}
