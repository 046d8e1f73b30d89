//! Background writer that persists execution records from the event bus.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use switchyard_types::event::OrchestratorEvent;

use super::execution_log::SqliteExecutionLog;

/// Totals reported when the writer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditWriterStats {
    pub written: u64,
    pub failed: u64,
    pub lagged: u64,
}

/// Subscribe-side audit writer.
///
/// Writes every `Execution` event to the log until `cancel` fires or the bus
/// closes. Events already queued when cancelled are drained first, so a
/// graceful shutdown loses nothing that was published before it.
pub fn spawn_audit_writer(
    log: SqliteExecutionLog,
    mut rx: broadcast::Receiver<OrchestratorEvent>,
    cancel: CancellationToken,
) -> JoinHandle<AuditWriterStats> {
    tokio::spawn(async move {
        let mut stats = AuditWriterStats::default();
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(event) => write_event(&log, &event, &mut stats).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "audit writer lagged, execution records dropped");
                    stats.lagged += skipped;
                }
                Err(broadcast::error::RecvError::Closed) => return stats,
            }
        }

        while let Ok(event) = rx.try_recv() {
            write_event(&log, &event, &mut stats).await;
        }
        tracing::debug!(written = stats.written, failed = stats.failed, "audit writer stopped");
        stats
    })
}

async fn write_event(log: &SqliteExecutionLog, event: &OrchestratorEvent, stats: &mut AuditWriterStats) {
    let OrchestratorEvent::Execution(record) = event else {
        return;
    };
    match log.append(record).await {
        Ok(()) => stats.written += 1,
        Err(e) => {
            stats.failed += 1;
            tracing::warn!(
                provider = %record.provider,
                record_id = %record.id,
                error = %e,
                "failed to persist execution record"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::DatabasePool;
    use chrono::Utc;
    use switchyard_types::health::HealthState;
    use switchyard_types::operation::OperationKind;
    use switchyard_types::record::{AttemptOutcome, ExecutionRecord};
    use uuid::Uuid;

    async fn test_log() -> SqliteExecutionLog {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        SqliteExecutionLog::new(DatabasePool::new(&url).await.unwrap())
    }

    fn record(provider: &str) -> ExecutionRecord {
        ExecutionRecord {
            id: Uuid::now_v7(),
            request_id: Uuid::now_v7(),
            provider: provider.to_string(),
            operation: OperationKind::GetPositions,
            timestamp: Utc::now(),
            latency_ms: 12,
            outcome: AttemptOutcome::Success,
            error_kind: None,
            error_message: None,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_writer_persists_execution_events_only() {
        let log = test_log().await;
        let (tx, rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let handle = spawn_audit_writer(log.clone(), rx, cancel.clone());

        tx.send(OrchestratorEvent::Execution(record("alpaca"))).unwrap();
        tx.send(OrchestratorEvent::HealthChanged {
            provider: "alpaca".to_string(),
            from: HealthState::Available,
            to: HealthState::Degraded,
            reason: "timeout".to_string(),
        })
        .unwrap();
        tx.send(OrchestratorEvent::Execution(record("tradier"))).unwrap();
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.written, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(log.recent(10, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_drains_queued_events() {
        let log = test_log().await;
        let (tx, rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            tx.send(OrchestratorEvent::Execution(record("ib"))).unwrap();
        }
        cancel.cancel();
        let stats = spawn_audit_writer(log.clone(), rx, cancel).await.unwrap();

        assert_eq!(stats.written, 3);
        assert_eq!(log.recent(10, Some("ib")).await.unwrap().len(), 3);
    }
}
