use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use campus_audit::{AuditPolicy, AuditRecorder, AuditStore, InMemoryAuditStore};
use campus_auth::PermissionMatrix;
use campus_infra::{
    AppConfig, DataLayer, InMemoryDataStore, PostgresAuditStore, PostgresDataStore, RecordStore,
};

use crate::authz::AuthorizationPipeline;

/// Everything the handlers, the access guard and the audit layer share.
///
/// Built once at startup; read-only afterwards.
pub struct AppServices {
    pub records: Arc<dyn RecordStore>,
    pub data: Arc<dyn DataLayer>,
    pub audit: AuditRecorder,
    pub policy: AuditPolicy,
    pub matrix: Arc<PermissionMatrix>,
    pub pipeline: AuthorizationPipeline,
    pub lookup_timeout: Duration,
    pub body_limit: usize,
}

impl AppServices {
    pub fn new(
        records: Arc<dyn RecordStore>,
        data: Arc<dyn DataLayer>,
        audit_store: Arc<dyn AuditStore>,
        config: &AppConfig,
    ) -> anyhow::Result<Self> {
        let matrix = Arc::new(PermissionMatrix::standard().context("invalid permission matrix")?);
        let audit = AuditRecorder::new(audit_store);
        let pipeline = AuthorizationPipeline::new(
            Arc::clone(&matrix),
            Arc::clone(&data),
            audit.clone(),
            config.lookup_timeout,
        );

        Ok(Self {
            records,
            data,
            audit,
            policy: AuditPolicy::default(),
            matrix,
            pipeline,
            lookup_timeout: config.lookup_timeout,
            body_limit: config.audit_body_limit_bytes,
        })
    }

    pub fn audit_store(&self) -> &Arc<dyn AuditStore> {
        self.audit.store()
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    if config.use_persistent_stores {
        return build_persistent_services(config).await;
    }

    tracing::info!("using in-memory stores");
    let store = Arc::new(InMemoryDataStore::new());
    AppServices::new(
        store.clone(),
        store,
        Arc::new(InMemoryAuditStore::new()),
        config,
    )
}

async fn build_persistent_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store = Arc::new(PostgresDataStore::new(pool.clone()));
    store
        .ensure_schema()
        .await
        .context("failed to prepare records table")?;

    let audit_store = Arc::new(PostgresAuditStore::new(pool));
    audit_store
        .ensure_schema()
        .await
        .context("failed to prepare audit_logs table")?;

    tracing::info!("using Postgres stores");
    AppServices::new(store.clone(), store, audit_store, config)
}
