//! Application state wiring the orchestrator, analytics and persistence.
//!
//! AppState holds the concrete instances used by both CLI and REST API.
//! Providers are the simulated backend from `switchyard-infra`, one per
//! configured provider.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use switchyard_core::AnalyticsAggregator;
use switchyard_core::clock::SystemClock;
use switchyard_core::orchestrator::{BackgroundTasks, Orchestrator};
use switchyard_infra::config::{LoadedConfig, default_config_path, load_config, resolve_data_dir};
use switchyard_infra::simulated::simulated_registry;
use switchyard_infra::sqlite::audit::{AuditWriterStats, spawn_audit_writer};
use switchyard_infra::sqlite::execution_log::SqliteExecutionLog;
use switchyard_infra::sqlite::pool::{DatabasePool, database_url};
use switchyard_infra::sqlite::provider_health::SqliteProviderHealthStore;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub analytics: Arc<AnalyticsAggregator>,
    pub execution_log: SqliteExecutionLog,
    pub health_store: SqliteProviderHealthStore,
    pub config: Arc<LoadedConfig>,
    pub data_dir: PathBuf,
}

/// Tasks started by [`AppState::start`].
pub struct Runtime {
    cancel: CancellationToken,
    background: Option<BackgroundTasks>,
    audit: JoinHandle<AuditWriterStats>,
    analytics: JoinHandle<()>,
}

impl Runtime {
    /// Stop every task, draining queued audit records first.
    pub async fn shutdown(self) -> AuditWriterStats {
        if let Some(background) = self.background {
            background.shutdown().await;
        }
        self.cancel.cancel();
        if let Err(e) = self.analytics.await {
            tracing::warn!(error = %e, "analytics subscriber ended abnormally");
        }
        match self.audit.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "audit writer ended abnormally");
                AuditWriterStats::default()
            }
        }
    }
}

impl AppState {
    /// Load config, open the database and wire everything together.
    ///
    /// `config_path` overrides `{data_dir}/switchyard.toml`.
    pub async fn init(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let config_path = config_path.unwrap_or_else(|| default_config_path(&data_dir));
        let loaded = load_config(&config_path).await?;

        let db_pool = DatabasePool::new(&database_url(&data_dir))
            .await
            .context("failed to open the switchyard database")?;

        Self::build(loaded, data_dir, db_pool).await
    }

    /// Wire state from already-loaded parts.
    pub async fn build(
        loaded: LoadedConfig,
        data_dir: PathBuf,
        db_pool: DatabasePool,
    ) -> anyhow::Result<Self> {
        let registry = simulated_registry(&loaded.orchestrator, &loaded.simulation);
        let orchestrator = Orchestrator::new(loaded.orchestrator.clone(), registry)?;

        let health_store = SqliteProviderHealthStore::new(db_pool.clone());
        let restored = health_store.load_all().await?;
        for snapshot in &restored {
            orchestrator.health().restore(snapshot);
        }
        if !restored.is_empty() {
            tracing::debug!(providers = restored.len(), "restored persisted provider health");
        }

        let analytics = AnalyticsAggregator::new(
            orchestrator.limiter().clone(),
            orchestrator.health().clone(),
            Arc::new(SystemClock),
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            analytics: Arc::new(analytics),
            execution_log: SqliteExecutionLog::new(db_pool.clone()),
            health_store,
            config: Arc::new(loaded),
            data_dir,
        })
    }

    /// Subscribe the audit writer and analytics aggregator to the event bus.
    /// With `background`, also start health probers and the usage sampler.
    pub async fn start(&self, background: bool) -> Runtime {
        let cancel = CancellationToken::new();
        let audit = spawn_audit_writer(
            self.execution_log.clone(),
            self.orchestrator.events().subscribe(),
            cancel.clone(),
        );
        let analytics = self
            .analytics
            .spawn(self.orchestrator.events().subscribe(), cancel.clone());
        let background = if background {
            Some(self.orchestrator.start_background().await)
        } else {
            None
        };
        Runtime {
            cancel,
            background,
            audit,
            analytics,
        }
    }

    /// Write current health snapshots so the next process starts from them.
    pub async fn persist_health(&self) -> anyhow::Result<usize> {
        let snapshots = self.orchestrator.health().snapshots();
        let written = self.health_store.save_all(&snapshots).await?;
        tracing::debug!(written, "persisted provider health");
        Ok(written)
    }

    /// Human-readable description of where the config came from.
    pub fn config_source(&self) -> String {
        match &self.config.source {
            Some(path) => path.display().to_string(),
            None => "defaults (no config file)".to_string(),
        }
    }
}
