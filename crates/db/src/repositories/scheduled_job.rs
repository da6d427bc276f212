use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tollgate_core::domain::job::{JobId, ScheduledJob, SchedulerHandle};
use tollgate_core::domain::tenant::TenantId;

use super::{
    is_unique_violation, parse_timestamp, JobInsertOutcome, RepositoryError,
    ScheduledJobRepository,
};
use crate::DbPool;

const JOB_COLUMNS: &str = "id, tenant_id, job_name, prompt_text, schedule, thread_id,
    message_id, file_url, handle, created_at, updated_at";

pub struct SqlScheduledJobRepository {
    pool: DbPool,
}

impl SqlScheduledJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ScheduledJobRepository for SqlScheduledJobRepository {
    async fn insert_within_quota(
        &self,
        job: &ScheduledJob,
        limit: i64,
    ) -> Result<JobInsertOutcome, RepositoryError> {
        let mut conn = self.pool.acquire().await?;

        // Count and insert under one write lock so two concurrent creates
        // for the same tenant cannot both pass the quota check.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let count = match sqlx::query(
            "SELECT COUNT(*) AS count FROM scheduled_jobs WHERE tenant_id = ?",
        )
        .bind(job.tenant_id.0)
        .fetch_one(&mut *conn)
        .await
        {
            Ok(row) => row.get::<i64, _>("count"),
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(error.into());
            }
        };

        if count >= limit {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Ok(JobInsertOutcome::QuotaExceeded { count, limit });
        }

        let insert = sqlx::query(
            "INSERT INTO scheduled_jobs (
                id, tenant_id, job_name, prompt_text, schedule, thread_id,
                message_id, file_url, handle, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.id.0)
        .bind(job.tenant_id.0)
        .bind(&job.job_name)
        .bind(&job.prompt_text)
        .bind(&job.schedule)
        .bind(job.thread_id)
        .bind(job.message_id)
        .bind(job.file_url.as_deref())
        .bind(&job.handle.0)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await;

        match insert {
            Ok(_) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(JobInsertOutcome::Inserted)
            }
            Err(error) if is_unique_violation(&error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Ok(JobInsertOutcome::IdCollision)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error.into())
            }
        }
    }

    async fn find(
        &self,
        id: &JobId,
        tenant_id: TenantId,
    ) -> Result<Option<ScheduledJob>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE id = ? AND tenant_id = ?"
        ))
        .bind(&id.0)
        .bind(tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(job_from_row).transpose()
    }

    async fn update(&self, job: &ScheduledJob) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE scheduled_jobs SET
                job_name = ?,
                prompt_text = ?,
                schedule = ?,
                thread_id = ?,
                message_id = ?,
                file_url = ?,
                handle = ?,
                updated_at = ?
             WHERE id = ? AND tenant_id = ?",
        )
        .bind(&job.job_name)
        .bind(&job.prompt_text)
        .bind(&job.schedule)
        .bind(job.thread_id)
        .bind(job.message_id)
        .bind(job.file_url.as_deref())
        .bind(&job.handle.0)
        .bind(job.updated_at.to_rfc3339())
        .bind(&job.id.0)
        .bind(job.tenant_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &JobId, tenant_id: TenantId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE id = ? AND tenant_id = ?")
            .bind(&id.0)
            .bind(tenant_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ScheduledJob>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE tenant_id = ? ORDER BY created_at ASC"
        ))
        .bind(tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(job_from_row).collect()
    }

    async fn count_for_tenant(&self, tenant_id: TenantId) -> Result<i64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM scheduled_jobs WHERE tenant_id = ?")
            .bind(tenant_id.0)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }

    async fn delete_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<(JobId, SchedulerHandle)>, RepositoryError> {
        let rows = sqlx::query("SELECT id, handle FROM scheduled_jobs WHERE tenant_id = ?")
            .bind(tenant_id.0)
            .fetch_all(&self.pool)
            .await?;

        let pairs: Vec<(JobId, SchedulerHandle)> = rows
            .into_iter()
            .map(|row| {
                (JobId(row.get::<String, _>("id")), SchedulerHandle(row.get::<String, _>("handle")))
            })
            .collect();

        sqlx::query("DELETE FROM scheduled_jobs WHERE tenant_id = ?")
            .bind(tenant_id.0)
            .execute(&self.pool)
            .await?;

        Ok(pairs)
    }
}

fn job_from_row(row: SqliteRow) -> Result<ScheduledJob, RepositoryError> {
    Ok(ScheduledJob {
        id: JobId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        job_name: row.try_get("job_name")?,
        prompt_text: row.try_get("prompt_text")?,
        schedule: row.try_get("schedule")?,
        thread_id: row.try_get("thread_id")?,
        message_id: row.try_get("message_id")?,
        file_url: row.try_get("file_url")?,
        handle: SchedulerHandle(row.try_get("handle")?),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
