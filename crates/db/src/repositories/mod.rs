use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use tollgate_core::domain::job::{JobId, ScheduledJob, SchedulerHandle};
use tollgate_core::domain::limits::{EndpointRateLimit, TierRateLimit, UsageReport};
use tollgate_core::domain::settings::ServerSettings;
use tollgate_core::domain::tenant::{NewTenant, Tenant, TenantId, TenantIdentity};
use tollgate_core::domain::tools::Tool;
use tollgate_core::Decision;

pub mod checkpoint;
pub mod rate_limits;
pub mod scheduled_job;
pub mod settings;
pub mod tenant;
pub mod tools;

pub use checkpoint::SqlCheckpointRepository;
pub use rate_limits::SqlRateLimitRepository;
pub use scheduled_job::SqlScheduledJobRepository;
pub use settings::SqlSettingsRepository;
pub use tenant::SqlTenantRepository;
pub use tools::SqlToolsRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Whether a sqlx error is a SQLite unique-constraint violation.
/// Scheduled-job id collisions surface this way.
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_error) if db_error.is_unique_violation())
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

/// Outcome of the guarded scheduled-job insert. The quota check and the
/// insert happen inside one write transaction so two concurrent creates
/// cannot both pass the count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobInsertOutcome {
    Inserted,
    QuotaExceeded { count: i64, limit: i64 },
    IdCollision,
}

/// Per-table deletion counts from a conversation reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckpointClearCounts {
    pub checkpoints: u64,
    pub blobs: u64,
    pub writes: u64,
}

impl CheckpointClearCounts {
    pub fn total(&self) -> u64 {
        self.checkpoints + self.blobs + self.writes
    }
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_identity(
        &self,
        identity: &TenantIdentity,
    ) -> Result<Option<Tenant>, RepositoryError>;

    /// Pre-provisions a tenant row. If the chat id or user name is already
    /// bound, returns the existing record instead of failing.
    async fn create(&self, new_tenant: NewTenant) -> Result<Tenant, RepositoryError>;

    /// One authorization attempt: snapshot-read, policy evaluation, and
    /// counter mutation inside a single write transaction.
    async fn authorize(
        &self,
        identity: &TenantIdentity,
        now: DateTime<Utc>,
    ) -> Result<Decision, RepositoryError>;

    async fn usage_report(&self, chat_id: i64) -> Result<Option<UsageReport>, RepositoryError>;

    /// Flips the maintenance flag on every non-admin tenant; returns the
    /// number of rows touched.
    async fn set_service_maintenance(&self, enabled: bool) -> Result<u64, RepositoryError>;

    async fn delete(&self, tenant_id: TenantId) -> Result<bool, RepositoryError>;

    async fn delete_transcription_jobs(&self, tenant_id: TenantId)
        -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait RateLimitRepository: Send + Sync {
    async fn tier_limit(&self, tier: i64) -> Result<Option<TierRateLimit>, RepositoryError>;

    async fn endpoint_limit(
        &self,
        endpoint: &str,
    ) -> Result<Option<EndpointRateLimit>, RepositoryError>;
}

#[async_trait]
pub trait ScheduledJobRepository: Send + Sync {
    /// Inserts the job only if the tenant's live count is below `limit`.
    async fn insert_within_quota(
        &self,
        job: &ScheduledJob,
        limit: i64,
    ) -> Result<JobInsertOutcome, RepositoryError>;

    async fn find(
        &self,
        id: &JobId,
        tenant_id: TenantId,
    ) -> Result<Option<ScheduledJob>, RepositoryError>;

    async fn update(&self, job: &ScheduledJob) -> Result<bool, RepositoryError>;

    async fn delete(&self, id: &JobId, tenant_id: TenantId) -> Result<bool, RepositoryError>;

    async fn list_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ScheduledJob>, RepositoryError>;

    async fn count_for_tenant(&self, tenant_id: TenantId) -> Result<i64, RepositoryError>;

    /// Removes every job the tenant owns; returns the (id, handle) pairs so
    /// the caller can unregister the scheduler side.
    async fn delete_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<(JobId, SchedulerHandle)>, RepositoryError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// The row with the highest version, if any rows exist.
    async fn current(&self) -> Result<Option<ServerSettings>, RepositoryError>;

    async fn insert_version(
        &self,
        callback_secret: &str,
        invoker_base_url: &str,
        allowed_models: &[String],
    ) -> Result<ServerSettings, RepositoryError>;
}

#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    async fn clear_thread(
        &self,
        thread_id: i64,
    ) -> Result<CheckpointClearCounts, RepositoryError>;
}

#[async_trait]
pub trait ToolsRepository: Send + Sync {
    async fn available_for_tier(&self, tier: i64) -> Result<Vec<Tool>, RepositoryError>;

    async fn find(&self, name: &str) -> Result<Option<Tool>, RepositoryError>;
}
