//! SQLite execution audit log.
//!
//! Append-only record of every request the orchestrator actually sent, with
//! query methods for recent history and per-provider outcome counts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use switchyard_types::error::RepositoryError;
use switchyard_types::record::{AttemptOutcome, ErrorKind, ExecutionRecord};
use uuid::Uuid;

use super::pool::DatabasePool;

/// Success/failure tallies for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderOutcomeCounts {
    pub provider: String,
    pub successes: u64,
    pub failures: u64,
    pub cancelled: u64,
}

/// SQLite-backed execution log.
#[derive(Clone)]
pub struct SqliteExecutionLog {
    pool: DatabasePool,
}

impl SqliteExecutionLog {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Append one execution record.
    pub async fn append(&self, record: &ExecutionRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO execution_log (id, request_id, provider, operation, timestamp, latency_ms, outcome, error_kind, error_message, attempt)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(record.request_id.to_string())
        .bind(&record.provider)
        .bind(record.operation.as_str())
        .bind(format_datetime(&record.timestamp))
        .bind(record.latency_ms as i64)
        .bind(record.outcome.to_string())
        .bind(record.error_kind.map(|k| k.to_string()))
        .bind(&record.error_message)
        .bind(i64::from(record.attempt))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    /// Most recent records first, optionally for a single provider.
    pub async fn recent(
        &self,
        limit: i64,
        provider: Option<&str>,
    ) -> Result<Vec<ExecutionRecord>, RepositoryError> {
        let rows = match provider {
            Some(provider) => {
                sqlx::query(
                    "SELECT * FROM execution_log WHERE provider = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
                )
                .bind(provider)
                .bind(limit)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM execution_log ORDER BY timestamp DESC, id DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows_to_records(&rows)
    }

    /// Every attempt made for one request, in attempt order.
    pub async fn for_request(&self, request_id: &Uuid) -> Result<Vec<ExecutionRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM execution_log WHERE request_id = ? ORDER BY attempt")
            .bind(request_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows_to_records(&rows)
    }

    /// Outcome counts per provider, by provider name.
    pub async fn counts(&self) -> Result<Vec<ProviderOutcomeCounts>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT provider,
                      SUM(CASE WHEN outcome = 'success' THEN 1 ELSE 0 END) AS successes,
                      SUM(CASE WHEN outcome = 'failure' THEN 1 ELSE 0 END) AS failures,
                      SUM(CASE WHEN outcome = 'cancelled' THEN 1 ELSE 0 END) AS cancelled
               FROM execution_log
               GROUP BY provider
               ORDER BY provider"#,
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let provider: String = row
                .try_get("provider")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let successes: i64 = row
                .try_get("successes")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let failures: i64 = row
                .try_get("failures")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let cancelled: i64 = row
                .try_get("cancelled")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            out.push(ProviderOutcomeCounts {
                provider,
                successes: successes as u64,
                failures: failures as u64,
                cancelled: cancelled as u64,
            });
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Private Row types
// ---------------------------------------------------------------------------

struct ExecutionRow {
    id: String,
    request_id: String,
    provider: String,
    operation: String,
    timestamp: String,
    latency_ms: i64,
    outcome: String,
    error_kind: Option<String>,
    error_message: Option<String>,
    attempt: i64,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            request_id: row.try_get("request_id")?,
            provider: row.try_get("provider")?,
            operation: row.try_get("operation")?,
            timestamp: row.try_get("timestamp")?,
            latency_ms: row.try_get("latency_ms")?,
            outcome: row.try_get("outcome")?,
            error_kind: row.try_get("error_kind")?,
            error_message: row.try_get("error_message")?,
            attempt: row.try_get("attempt")?,
        })
    }

    fn into_record(self) -> Result<ExecutionRecord, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid record id: {e}")))?;
        let request_id = Uuid::parse_str(&self.request_id)
            .map_err(|e| RepositoryError::Query(format!("invalid request_id: {e}")))?;
        let outcome: AttemptOutcome = self.outcome.parse().map_err(RepositoryError::Query)?;
        let error_kind = self
            .error_kind
            .as_deref()
            .map(str::parse::<ErrorKind>)
            .transpose()
            .map_err(RepositoryError::Query)?;

        Ok(ExecutionRecord {
            id,
            request_id,
            provider: self.provider,
            operation: self.operation.into(),
            timestamp: parse_datetime(&self.timestamp)?,
            latency_ms: self.latency_ms as u64,
            outcome,
            error_kind,
            error_message: self.error_message,
            attempt: self.attempt as u32,
        })
    }
}

fn rows_to_records(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<ExecutionRecord>, RepositoryError> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let raw = ExecutionRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
        records.push(raw.into_record()?);
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
