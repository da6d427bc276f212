pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{
    CheckpointClearCounts, CheckpointRepository, JobInsertOutcome, RateLimitRepository,
    RepositoryError, ScheduledJobRepository, SettingsRepository, SqlCheckpointRepository,
    SqlRateLimitRepository, SqlScheduledJobRepository, SqlSettingsRepository, SqlTenantRepository,
    SqlToolsRepository, TenantRepository, ToolsRepository,
};
