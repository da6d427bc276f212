//! Scheduled-job lifecycle: the dual-write protocol between the external
//! scheduler and the bookkeeping table.
//!
//! Ordering rules: a create registers with the scheduler before inserting
//! the row, so a row never exists without a registration behind it; a
//! delete unregisters best-effort and always removes the row, so the worst
//! failure mode is an orphaned registration, which reconciliation can find
//! through `exists`.

use std::sync::Arc;

use chrono::Utc;
use rand::thread_rng;
use tracing::{info, warn};

use tollgate_core::domain::job::{CallbackPayload, JobId, ScheduledJob, SchedulerHandle};
use tollgate_core::domain::tenant::{Tenant, TenantIdentity};
use tollgate_core::{generate_job_id, GatewayError, MAX_JOB_ID_ATTEMPTS};
use tollgate_db::repositories::{
    JobInsertOutcome, RateLimitRepository, ScheduledJobRepository, SettingsRepository,
    TenantRepository,
};

use crate::invoker::trigger_url;
use crate::persistence_error;
use crate::scheduler::{CallbackRegistration, JobScheduler};

#[derive(Clone, Debug)]
pub struct CreateJobRequest {
    pub chat_id: i64,
    pub job_name: String,
    pub prompt_text: String,
    pub schedule: String,
    pub thread_id: i64,
    pub message_id: Option<i64>,
    pub file_url: Option<String>,
}

/// Prompt and schedule are optional and keep their stored values when
/// unset; the thread reference is always caller-supplied, so an edit can
/// re-home the job to a different conversation thread.
#[derive(Clone, Debug)]
pub struct UpdateJobRequest {
    pub chat_id: i64,
    pub job_id: JobId,
    pub prompt_text: Option<String>,
    pub schedule: Option<String>,
    pub thread_id: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeleteJobReport {
    /// Whether a live scheduler registration was actually removed. False
    /// means the registration was already gone.
    pub job_unscheduled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSummary {
    pub id: JobId,
    pub prompt_text: String,
    pub schedule: String,
}

pub struct ScheduledJobManager {
    scheduler: Arc<dyn JobScheduler>,
    jobs: Arc<dyn ScheduledJobRepository>,
    tenants: Arc<dyn TenantRepository>,
    limits: Arc<dyn RateLimitRepository>,
    settings: Arc<dyn SettingsRepository>,
    id_generator: Box<dyn Fn() -> String + Send + Sync>,
}

impl ScheduledJobManager {
    pub fn new(
        scheduler: Arc<dyn JobScheduler>,
        jobs: Arc<dyn ScheduledJobRepository>,
        tenants: Arc<dyn TenantRepository>,
        limits: Arc<dyn RateLimitRepository>,
        settings: Arc<dyn SettingsRepository>,
    ) -> Self {
        Self {
            scheduler,
            jobs,
            tenants,
            limits,
            settings,
            id_generator: Box::new(|| generate_job_id(&mut thread_rng())),
        }
    }

    /// Replaces the id source. Tests use this to force collisions.
    pub fn with_id_generator(
        mut self,
        id_generator: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    pub async fn create(&self, request: CreateJobRequest) -> Result<ScheduledJob, GatewayError> {
        let tenant = self.resolve_tenant(request.chat_id).await?;
        let quota = self.job_quota(tenant.tier).await?;

        // Fast precheck; the authoritative count happens inside the insert
        // transaction.
        let count = self.jobs.count_for_tenant(tenant.id).await.map_err(persistence_error)?;
        if count >= quota {
            return Err(GatewayError::QuotaExceeded { tier: tenant.tier, limit: quota });
        }

        let callback = self
            .callback_registration(
                request.chat_id,
                request.prompt_text.clone(),
                request.message_id,
                request.file_url.clone(),
                request.thread_id,
            )
            .await?;

        // Register first: a bookkeeping row must never point at nothing.
        let handle = self.scheduler.register(&request.job_name, &request.schedule, &callback).await?;

        for attempt in 1..=MAX_JOB_ID_ATTEMPTS {
            let now = Utc::now();
            let job = ScheduledJob {
                id: JobId((self.id_generator)()),
                tenant_id: tenant.id,
                job_name: request.job_name.clone(),
                prompt_text: request.prompt_text.clone(),
                schedule: request.schedule.clone(),
                thread_id: request.thread_id,
                message_id: request.message_id,
                file_url: request.file_url.clone(),
                handle: handle.clone(),
                created_at: now,
                updated_at: now,
            };

            match self.jobs.insert_within_quota(&job, quota).await {
                Ok(JobInsertOutcome::Inserted) => {
                    info!(
                        event_name = "job_created",
                        job_id = %job.id.0,
                        tenant_id = tenant.id.0,
                        schedule = %job.schedule,
                        "scheduled job created"
                    );
                    return Ok(job);
                }
                Ok(JobInsertOutcome::QuotaExceeded { .. }) => {
                    self.cleanup_registration(&handle).await;
                    return Err(GatewayError::QuotaExceeded { tier: tenant.tier, limit: quota });
                }
                Ok(JobInsertOutcome::IdCollision) => {
                    warn!(
                        event_name = "job_id_collision",
                        tenant_id = tenant.id.0,
                        attempt,
                        "job id collided, regenerating"
                    );
                }
                Err(error) => {
                    self.cleanup_registration(&handle).await;
                    return Err(persistence_error(error));
                }
            }
        }

        self.cleanup_registration(&handle).await;
        Err(GatewayError::IdGenerationExhausted { attempts: MAX_JOB_ID_ATTEMPTS })
    }

    pub async fn update(&self, request: UpdateJobRequest) -> Result<ScheduledJob, GatewayError> {
        let tenant = self.resolve_tenant(request.chat_id).await?;
        let stored = self
            .jobs
            .find(&request.job_id, tenant.id)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| {
                GatewayError::NotFound(format!("scheduled job {}", request.job_id.0))
            })?;

        let prompt_text = request.prompt_text.unwrap_or_else(|| stored.prompt_text.clone());
        let schedule = request.schedule.unwrap_or_else(|| stored.schedule.clone());

        // The replacement payload carries the caller's thread reference but
        // keeps any stored message/file context.
        let callback = self
            .callback_registration(
                request.chat_id,
                prompt_text.clone(),
                stored.message_id,
                stored.file_url.clone(),
                request.thread_id,
            )
            .await?;

        let removed = self.scheduler.unregister(&stored.handle).await?;
        if !removed {
            warn!(
                event_name = "job_handle_missing",
                job_id = %stored.id.0,
                "old registration was already gone before update"
            );
        }

        let handle = self.scheduler.register(&stored.job_name, &schedule, &callback).await?;

        let updated = ScheduledJob {
            prompt_text,
            schedule,
            thread_id: request.thread_id,
            handle: handle.clone(),
            updated_at: Utc::now(),
            ..stored
        };

        if !self.jobs.update(&updated).await.map_err(persistence_error)? {
            self.cleanup_registration(&handle).await;
            return Err(GatewayError::NotFound(format!("scheduled job {}", updated.id.0)));
        }

        info!(
            event_name = "job_updated",
            job_id = %updated.id.0,
            tenant_id = tenant.id.0,
            schedule = %updated.schedule,
            "scheduled job updated"
        );

        Ok(updated)
    }

    pub async fn delete(
        &self,
        chat_id: i64,
        job_id: &JobId,
    ) -> Result<DeleteJobReport, GatewayError> {
        let tenant = self.resolve_tenant(chat_id).await?;
        let stored = self
            .jobs
            .find(job_id, tenant.id)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| GatewayError::NotFound(format!("scheduled job {}", job_id.0)))?;

        // Unregistration is best-effort: the row goes away regardless, and
        // the report tells the caller whether a live registration was
        // removed.
        let job_unscheduled = match self.scheduler.exists(&stored.handle).await {
            Ok(true) => self.scheduler.unregister(&stored.handle).await.unwrap_or_else(|error| {
                warn!(
                    event_name = "job_unregister_failed",
                    job_id = %stored.id.0,
                    error = %error,
                    "could not unregister scheduler handle"
                );
                false
            }),
            Ok(false) => {
                warn!(
                    event_name = "job_handle_missing",
                    job_id = %stored.id.0,
                    "registration already gone at delete time"
                );
                false
            }
            Err(error) => {
                warn!(
                    event_name = "job_handle_lookup_failed",
                    job_id = %stored.id.0,
                    error = %error,
                    "could not check scheduler handle"
                );
                false
            }
        };

        self.jobs.delete(job_id, tenant.id).await.map_err(persistence_error)?;

        info!(
            event_name = "job_deleted",
            job_id = %job_id.0,
            tenant_id = tenant.id.0,
            job_unscheduled,
            "scheduled job deleted"
        );

        Ok(DeleteJobReport { job_unscheduled })
    }

    pub async fn list(&self, chat_id: i64) -> Result<Vec<JobSummary>, GatewayError> {
        let tenant = self.resolve_tenant(chat_id).await?;
        let jobs = self.jobs.list_for_tenant(tenant.id).await.map_err(persistence_error)?;

        Ok(jobs
            .into_iter()
            .map(|job| JobSummary {
                id: job.id,
                prompt_text: job.prompt_text,
                schedule: job.schedule,
            })
            .collect())
    }

    async fn resolve_tenant(&self, chat_id: i64) -> Result<Tenant, GatewayError> {
        self.tenants
            .find_by_identity(&TenantIdentity::by_chat_id(chat_id))
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| GatewayError::NotFound(format!("no tenant for chat id {chat_id}")))
    }

    /// A tier without a limits row gets a quota of zero.
    async fn job_quota(&self, tier: i64) -> Result<i64, GatewayError> {
        Ok(self
            .limits
            .tier_limit(tier)
            .await
            .map_err(persistence_error)?
            .map(|limit| limit.max_scheduled_jobs)
            .unwrap_or(0))
    }

    /// Builds the callback the scheduler will fire. Missing settings are a
    /// fatal configuration error, caught before any registration happens.
    async fn callback_registration(
        &self,
        chat_id: i64,
        prompt_text: String,
        message_id: Option<i64>,
        file_url: Option<String>,
        thread_id: i64,
    ) -> Result<CallbackRegistration, GatewayError> {
        let settings = self.settings.current().await.map_err(persistence_error)?.ok_or_else(
            || {
                GatewayError::Configuration(
                    "server settings are not provisioned; cannot build job callbacks".to_string(),
                )
            },
        )?;

        Ok(CallbackRegistration {
            url: trigger_url(&settings.invoker_base_url),
            secret: settings.callback_secret.clone(),
            payload: CallbackPayload {
                tenant_chat_id: chat_id,
                prompt_text,
                message_id,
                file_url,
                thread_id,
            },
        })
    }

    async fn cleanup_registration(&self, handle: &SchedulerHandle) {
        if let Err(error) = self.scheduler.unregister(handle).await {
            warn!(
                event_name = "job_cleanup_failed",
                handle = %handle.0,
                error = %error,
                "could not unregister handle after failed create"
            );
        }
    }
}
