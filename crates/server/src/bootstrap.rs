use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use tollgate_core::config::{AppConfig, ConfigError, LoadOptions};
use tollgate_core::GatewayError;
use tollgate_db::{
    connect, migrations, CheckpointRepository, DbPool, RateLimitRepository,
    ScheduledJobRepository, SettingsRepository, SqlCheckpointRepository, SqlRateLimitRepository,
    SqlScheduledJobRepository, SqlSettingsRepository, SqlTenantRepository, SqlToolsRepository,
    TenantRepository, ToolsRepository,
};
use tollgate_gateway::{
    AccessControlEvaluator, HttpJobScheduler, JobScheduler, ObjectStore, ScheduledJobManager,
    TenantService,
};

/// Bucket holding tenant uploads, keyed by `{chat_id}/...` prefixes.
const UPLOAD_BUCKET: &str = "user-files";

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub evaluator: AccessControlEvaluator,
    pub job_manager: ScheduledJobManager,
    pub tenant_service: TenantService,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("scheduler client setup failed: {0}")]
    Scheduler(#[source] GatewayError),
}

pub async fn bootstrap(
    options: LoadOptions,
    storage: Arc<dyn ObjectStore>,
) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config, storage).await
}

pub async fn bootstrap_with_config(
    config: AppConfig,
    storage: Arc<dyn ObjectStore>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let tenants: Arc<dyn TenantRepository> = Arc::new(SqlTenantRepository::new(db_pool.clone()));
    let jobs: Arc<dyn ScheduledJobRepository> =
        Arc::new(SqlScheduledJobRepository::new(db_pool.clone()));
    let limits: Arc<dyn RateLimitRepository> =
        Arc::new(SqlRateLimitRepository::new(db_pool.clone()));
    let settings: Arc<dyn SettingsRepository> =
        Arc::new(SqlSettingsRepository::new(db_pool.clone()));
    let checkpoints: Arc<dyn CheckpointRepository> =
        Arc::new(SqlCheckpointRepository::new(db_pool.clone()));
    let tools: Arc<dyn ToolsRepository> = Arc::new(SqlToolsRepository::new(db_pool.clone()));

    let scheduler: Arc<dyn JobScheduler> = Arc::new(
        HttpJobScheduler::new(
            &config.scheduler.base_url,
            config.scheduler.timeout_secs,
            config.scheduler.api_token.clone(),
        )
        .map_err(BootstrapError::Scheduler)?,
    );

    let evaluator = AccessControlEvaluator::new(tenants.clone());
    let job_manager = ScheduledJobManager::new(
        scheduler.clone(),
        jobs.clone(),
        tenants.clone(),
        limits,
        settings.clone(),
    );
    let tenant_service = TenantService::new(
        tenants,
        jobs,
        checkpoints,
        tools,
        settings,
        scheduler,
        storage,
        UPLOAD_BUCKET,
    );

    info!(
        event_name = "system.bootstrap.services_wired",
        correlation_id = "bootstrap",
        scheduler_base_url = %config.scheduler.base_url,
        "gateway services wired"
    );

    Ok(Application { config, db_pool, evaluator, job_manager, tenant_service })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tollgate_core::config::{ConfigOverrides, LoadOptions};
    use tollgate_core::domain::tenant::{NewTenant, TenantIdentity};
    use tollgate_gateway::InMemoryObjectStore;

    use crate::bootstrap::bootstrap;

    fn options_with_database(url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_rejects_a_non_sqlite_database_url() {
        let result = bootstrap(
            options_with_database("postgres://nope"),
            Arc::new(InMemoryObjectStore::new()),
        )
        .await;

        let message = match result {
            Ok(_) => panic!("expected config validation to fail"),
            Err(error) => error.to_string(),
        };
        assert!(message.contains("database.url"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_wires_a_usable_data_path() {
        let app = bootstrap(
            options_with_database("sqlite::memory:?cache=shared"),
            Arc::new(InMemoryObjectStore::new()),
        )
        .await
        .expect("bootstrap should succeed against an in-memory database");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN \
             ('tenants', 'tier_rate_limits', 'scheduled_jobs', 'server_settings')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("baseline tables should exist after bootstrap");
        assert_eq!(table_count, 4);

        // The wired services run against the same pool end to end.
        let tenant = app
            .tenant_service
            .create_tenant(NewTenant { chat_id: Some(71), ..NewTenant::default() })
            .await
            .expect("tenant creation should work through the wired service");
        assert_eq!(tenant.chat_id, Some(71));

        let decision = app
            .evaluator
            .authorize(&TenantIdentity::by_chat_id(71))
            .await
            .expect("authorization should work through the wired evaluator");
        assert!(decision.allowed);
        assert!(decision.first_interaction);

        app.db_pool.close().await;
    }
}
