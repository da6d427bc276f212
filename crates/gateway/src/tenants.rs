//! Tenant administration: provisioning, cascading deletion, dialog reset,
//! tool-catalog reads, and the maintenance switch.

use std::sync::Arc;

use tracing::{info, warn};

use tollgate_core::domain::settings::ServerSettings;
use tollgate_core::domain::tenant::{NewTenant, Tenant, TenantIdentity};
use tollgate_core::domain::tools::Tool;
use tollgate_core::GatewayError;
use tollgate_db::repositories::{
    CheckpointClearCounts, CheckpointRepository, ScheduledJobRepository, SettingsRepository,
    TenantRepository, ToolsRepository,
};

use crate::persistence_error;
use crate::scheduler::JobScheduler;
use crate::storage::ObjectStore;

/// What a cascading tenant deletion actually removed. Storage and
/// scheduler cleanup are best-effort and never roll back the row deletes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TenantDeletionReport {
    pub scheduled_jobs_deleted: usize,
    pub jobs_unscheduled: usize,
    pub transcription_jobs_deleted: u64,
    pub storage_objects_deleted: usize,
}

pub struct TenantService {
    tenants: Arc<dyn TenantRepository>,
    jobs: Arc<dyn ScheduledJobRepository>,
    checkpoints: Arc<dyn CheckpointRepository>,
    tools: Arc<dyn ToolsRepository>,
    settings: Arc<dyn SettingsRepository>,
    scheduler: Arc<dyn JobScheduler>,
    storage: Arc<dyn ObjectStore>,
    storage_bucket: String,
}

impl TenantService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        jobs: Arc<dyn ScheduledJobRepository>,
        checkpoints: Arc<dyn CheckpointRepository>,
        tools: Arc<dyn ToolsRepository>,
        settings: Arc<dyn SettingsRepository>,
        scheduler: Arc<dyn JobScheduler>,
        storage: Arc<dyn ObjectStore>,
        storage_bucket: impl Into<String>,
    ) -> Self {
        Self {
            tenants,
            jobs,
            checkpoints,
            tools,
            settings,
            scheduler,
            storage,
            storage_bucket: storage_bucket.into(),
        }
    }

    pub async fn create_tenant(&self, new_tenant: NewTenant) -> Result<Tenant, GatewayError> {
        let identity =
            TenantIdentity { chat_id: new_tenant.chat_id, user_name: new_tenant.user_name.clone() };
        identity.validate()?;

        let tenant = self.tenants.create(new_tenant).await.map_err(persistence_error)?;

        info!(
            event_name = "tenant_created",
            tenant_id = tenant.id.0,
            chat_id = tenant.chat_id,
            tier = tenant.tier,
            "tenant provisioned"
        );

        Ok(tenant)
    }

    /// Cascading delete: scheduled jobs (with best-effort unregister),
    /// transcription jobs, the tenant row, then object storage under the
    /// chat-id prefix. A tenant resolved only by user name with no bound
    /// chat id has no storage prefix, so storage is skipped.
    pub async fn delete_tenant(
        &self,
        identity: &TenantIdentity,
    ) -> Result<TenantDeletionReport, GatewayError> {
        identity.validate()?;

        let tenant = self
            .tenants
            .find_by_identity(identity)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| GatewayError::NotFound("tenant".to_string()))?;

        let mut report = TenantDeletionReport::default();

        let removed_jobs =
            self.jobs.delete_for_tenant(tenant.id).await.map_err(persistence_error)?;
        report.scheduled_jobs_deleted = removed_jobs.len();

        for (job_id, handle) in &removed_jobs {
            match self.scheduler.unregister(handle).await {
                Ok(true) => report.jobs_unscheduled += 1,
                Ok(false) => {}
                Err(error) => {
                    warn!(
                        event_name = "job_unregister_failed",
                        job_id = %job_id.0,
                        error = %error,
                        "could not unregister handle during tenant deletion"
                    );
                }
            }
        }

        report.transcription_jobs_deleted =
            self.tenants.delete_transcription_jobs(tenant.id).await.map_err(persistence_error)?;

        self.tenants.delete(tenant.id).await.map_err(persistence_error)?;

        if let Some(chat_id) = tenant.chat_id {
            match self
                .storage
                .delete_by_prefix(&self.storage_bucket, &format!("{chat_id}/"))
                .await
            {
                Ok(deleted) => report.storage_objects_deleted = deleted.len(),
                Err(error) => {
                    warn!(
                        event_name = "storage_cleanup_failed",
                        tenant_id = tenant.id.0,
                        chat_id,
                        error = %error,
                        "object storage cleanup failed; row deletes stand"
                    );
                }
            }
        }

        info!(
            event_name = "tenant_deleted",
            tenant_id = tenant.id.0,
            chat_id = tenant.chat_id,
            scheduled_jobs_deleted = report.scheduled_jobs_deleted,
            jobs_unscheduled = report.jobs_unscheduled,
            transcription_jobs_deleted = report.transcription_jobs_deleted,
            storage_objects_deleted = report.storage_objects_deleted,
            "tenant deleted"
        );

        Ok(report)
    }

    /// Resets one conversation thread. Idempotent: clearing an already
    /// empty thread reports zero counts.
    pub async fn clear_dialog(
        &self,
        chat_id: i64,
        thread_id: i64,
    ) -> Result<CheckpointClearCounts, GatewayError> {
        let tenant = self
            .tenants
            .find_by_identity(&TenantIdentity::by_chat_id(chat_id))
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| GatewayError::NotFound(format!("no tenant for chat id {chat_id}")))?;

        let counts =
            self.checkpoints.clear_thread(thread_id).await.map_err(persistence_error)?;

        info!(
            event_name = "dialog_cleared",
            tenant_id = tenant.id.0,
            thread_id,
            checkpoints = counts.checkpoints,
            blobs = counts.blobs,
            writes = counts.writes,
            "conversation thread reset"
        );

        Ok(counts)
    }

    pub async fn available_tools(&self, chat_id: i64) -> Result<Vec<Tool>, GatewayError> {
        let tenant = self.resolve_by_chat(chat_id).await?;
        self.tools.available_for_tier(tenant.tier).await.map_err(persistence_error)
    }

    /// Tier gate for a single tool. Unknown tools are simply inaccessible.
    pub async fn check_tool_access(
        &self,
        chat_id: i64,
        tool_name: &str,
    ) -> Result<bool, GatewayError> {
        let tenant = self.resolve_by_chat(chat_id).await?;
        let tool = self.tools.find(tool_name).await.map_err(persistence_error)?;

        Ok(tool.is_some_and(|tool| tool.accessible_by(tenant.tier)))
    }

    pub async fn set_service_maintenance(&self, enabled: bool) -> Result<u64, GatewayError> {
        let affected =
            self.tenants.set_service_maintenance(enabled).await.map_err(persistence_error)?;

        info!(
            event_name = "service_maintenance",
            enabled,
            affected,
            "maintenance flag toggled for non-admin tenants"
        );

        Ok(affected)
    }

    pub async fn current_settings(&self) -> Result<Option<ServerSettings>, GatewayError> {
        self.settings.current().await.map_err(persistence_error)
    }

    async fn resolve_by_chat(&self, chat_id: i64) -> Result<Tenant, GatewayError> {
        self.tenants
            .find_by_identity(&TenantIdentity::by_chat_id(chat_id))
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| GatewayError::NotFound(format!("no tenant for chat id {chat_id}")))
    }
}
