use sqlx::Row;

use tollgate_core::domain::limits::{EndpointRateLimit, TierRateLimit};

use super::{RateLimitRepository, RepositoryError};
use crate::DbPool;

pub struct SqlRateLimitRepository {
    pool: DbPool,
}

impl SqlRateLimitRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RateLimitRepository for SqlRateLimitRepository {
    async fn tier_limit(&self, tier: i64) -> Result<Option<TierRateLimit>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tier, pause_seconds, daily_limit, monthly_limit, max_scheduled_jobs
             FROM tier_rate_limits
             WHERE tier = ?",
        )
        .bind(tier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| TierRateLimit {
            tier: row.get("tier"),
            pause_seconds: row.get("pause_seconds"),
            daily_limit: row.get("daily_limit"),
            monthly_limit: row.get("monthly_limit"),
            max_scheduled_jobs: row.get("max_scheduled_jobs"),
        }))
    }

    async fn endpoint_limit(
        &self,
        endpoint: &str,
    ) -> Result<Option<EndpointRateLimit>, RepositoryError> {
        let row = sqlx::query(
            "SELECT endpoint, max_calls, interval_seconds
             FROM endpoint_rate_limits
             WHERE endpoint = ?",
        )
        .bind(endpoint)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| EndpointRateLimit {
            endpoint: row.get("endpoint"),
            max_calls: row.get("max_calls"),
            interval_seconds: row.get("interval_seconds"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::SqlRateLimitRepository;
    use crate::migrations;
    use crate::repositories::RateLimitRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn seeded_tier_limits_are_readable() {
        let pool = setup_pool().await;
        let repo = SqlRateLimitRepository::new(pool.clone());

        let tier_one = repo.tier_limit(1).await.expect("read tier").expect("tier 1 seeded");
        assert_eq!(tier_one.pause_seconds, 5);
        assert_eq!(tier_one.daily_limit, 100);
        assert_eq!(tier_one.max_scheduled_jobs, 2);

        assert!(repo.tier_limit(99).await.expect("read tier").is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn seeded_endpoint_limits_are_readable() {
        let pool = setup_pool().await;
        let repo = SqlRateLimitRepository::new(pool.clone());

        let message = repo
            .endpoint_limit("message")
            .await
            .expect("read endpoint")
            .expect("message endpoint seeded");
        assert_eq!(message.max_calls, 30);
        assert_eq!(message.interval_seconds, 60);

        assert!(repo.endpoint_limit("unknown").await.expect("read endpoint").is_none());

        pool.close().await;
    }
}
