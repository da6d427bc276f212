use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use tollgate_core::domain::limits::{TierRateLimit, UsageReport};
use tollgate_core::domain::tenant::{
    sanitize_user_name, NewTenant, Role, Tenant, TenantId, TenantIdentity, TenantStatus,
};
use tollgate_core::policy::{evaluate_access, AccessOutcome};
use tollgate_core::Decision;

use super::{
    is_unique_violation, parse_optional_timestamp, parse_timestamp, RepositoryError,
    TenantRepository,
};
use crate::DbPool;

const TENANT_COLUMNS: &str = "id, chat_id, user_name, role, status, active, suspended,
    service_maintenance, expire_at, tier, daily_usage, monthly_usage, messages_count,
    last_message_time, llm_choice, created_at, joined_at";

pub struct SqlTenantRepository {
    pool: DbPool,
}

impl SqlTenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TenantRepository for SqlTenantRepository {
    async fn find_by_identity(
        &self,
        identity: &TenantIdentity,
    ) -> Result<Option<Tenant>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        find_in_conn(&mut conn, identity).await
    }

    async fn create(&self, new_tenant: NewTenant) -> Result<Tenant, RepositoryError> {
        let user_name = new_tenant.user_name.as_deref().map(sanitize_user_name);
        let identity =
            TenantIdentity { chat_id: new_tenant.chat_id, user_name: user_name.clone() };

        if let Some(existing) = self.find_by_identity(&identity).await? {
            return Ok(existing);
        }

        let role = new_tenant.role.unwrap_or(Role::User);
        let tier = new_tenant.tier.unwrap_or(1);
        let now = Utc::now();

        let insert = sqlx::query(
            "INSERT INTO tenants (
                chat_id, user_name, role, status, active, suspended, service_maintenance,
                expire_at, tier, daily_usage, monthly_usage, messages_count, created_at
             ) VALUES (?, ?, ?, 'created', 0, 0, 0, ?, ?, 0, 0, 0, ?)",
        )
        .bind(new_tenant.chat_id)
        .bind(user_name.as_deref())
        .bind(role.as_str())
        .bind(new_tenant.expire_at.map(|value| value.to_rfc3339()))
        .bind(tier)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await;

        match insert {
            Ok(result) => {
                let id = result.last_insert_rowid();
                let mut conn = self.pool.acquire().await?;
                let row =
                    sqlx::query(&format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?"))
                        .bind(id)
                        .fetch_one(&mut *conn)
                        .await?;
                tenant_from_row(row)
            }
            // Lost a provisioning race; the existing binding wins.
            Err(error) if is_unique_violation(&error) => self
                .find_by_identity(&identity)
                .await?
                .ok_or_else(|| RepositoryError::Database(error)),
            Err(error) => Err(error.into()),
        }
    }

    async fn authorize(
        &self,
        identity: &TenantIdentity,
        now: DateTime<Utc>,
    ) -> Result<Decision, RepositoryError> {
        let mut conn = self.pool.acquire().await?;

        // BEGIN IMMEDIATE takes the write lock up front, serializing the
        // read-decide-write sequence against concurrent authorize calls.
        // SQLite's write lock is database-wide, so authorizations for
        // other tenants also wait here, bounded by the busy_timeout
        // pragma; WAL keeps plain reads unblocked meanwhile.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        match authorize_in_tx(&mut conn, identity, now).await {
            Ok(decision) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(decision)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    async fn usage_report(&self, chat_id: i64) -> Result<Option<UsageReport>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                t.tier,
                t.daily_usage,
                IFNULL(l.daily_limit, 0) AS daily_limit,
                t.monthly_usage,
                IFNULL(l.monthly_limit, 0) AS monthly_limit
             FROM tenants t
             LEFT JOIN tier_rate_limits l ON l.tier = t.tier
             WHERE t.chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| UsageReport {
            tier: row.get("tier"),
            daily_usage: row.get("daily_usage"),
            daily_limit: row.get("daily_limit"),
            monthly_usage: row.get("monthly_usage"),
            monthly_limit: row.get("monthly_limit"),
        }))
    }

    async fn set_service_maintenance(&self, enabled: bool) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE tenants SET service_maintenance = ? WHERE role <> 'admin'",
        )
        .bind(i64::from(enabled))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, tenant_id: TenantId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(tenant_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_transcription_jobs(
        &self,
        tenant_id: TenantId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM transcription_jobs WHERE tenant_id = ?")
            .bind(tenant_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Lookup inside an open connection: chat id binding wins over user name,
/// so a pre-provisioned row found by name is still reachable after its
/// chat id is bound.
async fn find_in_conn(
    conn: &mut SqliteConnection,
    identity: &TenantIdentity,
) -> Result<Option<Tenant>, RepositoryError> {
    if let Some(chat_id) = identity.chat_id {
        let row = sqlx::query(&format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE chat_id = ?"))
            .bind(chat_id)
            .fetch_optional(&mut *conn)
            .await?;
        if let Some(row) = row {
            return tenant_from_row(row).map(Some);
        }
    }

    if let Some(user_name) = &identity.user_name {
        let sanitized = sanitize_user_name(user_name);
        let row = sqlx::query(&format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE user_name = ?"))
            .bind(&sanitized)
            .fetch_optional(&mut *conn)
            .await?;
        if let Some(row) = row {
            return tenant_from_row(row).map(Some);
        }
    }

    Ok(None)
}

async fn authorize_in_tx(
    conn: &mut SqliteConnection,
    identity: &TenantIdentity,
    now: DateTime<Utc>,
) -> Result<Decision, RepositoryError> {
    let Some(tenant) = find_in_conn(conn, identity).await? else {
        return Ok(Decision::not_found());
    };

    let limit = tier_limit_in_conn(conn, tenant.tier).await?.ok_or_else(|| {
        RepositoryError::Decode(format!("no tier_rate_limits row for tier {}", tenant.tier))
    })?;

    match evaluate_access(&tenant, &limit, now) {
        AccessOutcome::Deny(reason) => {
            Ok(Decision::deny(reason, Some(tenant.role), tenant.llm_choice))
        }
        AccessOutcome::AllowFirstContact => {
            sqlx::query(
                "UPDATE tenants SET
                    chat_id = COALESCE(chat_id, ?),
                    user_name = COALESCE(user_name, ?),
                    status = 'joined',
                    active = 1,
                    messages_count = messages_count + 1,
                    joined_at = ?
                 WHERE id = ?",
            )
            .bind(identity.chat_id)
            .bind(identity.user_name.as_deref().map(sanitize_user_name))
            .bind(now.to_rfc3339())
            .bind(tenant.id.0)
            .execute(&mut *conn)
            .await?;

            Ok(Decision::allow(tenant.role, tenant.llm_choice, true))
        }
        AccessOutcome::Allow => {
            sqlx::query(
                "UPDATE tenants SET
                    last_message_time = ?,
                    daily_usage = daily_usage + 1,
                    monthly_usage = monthly_usage + 1,
                    messages_count = messages_count + 1
                 WHERE id = ?",
            )
            .bind(now.to_rfc3339())
            .bind(tenant.id.0)
            .execute(&mut *conn)
            .await?;

            Ok(Decision::allow(tenant.role, tenant.llm_choice, false))
        }
    }
}

async fn tier_limit_in_conn(
    conn: &mut SqliteConnection,
    tier: i64,
) -> Result<Option<TierRateLimit>, RepositoryError> {
    let row = sqlx::query(
        "SELECT tier, pause_seconds, daily_limit, monthly_limit, max_scheduled_jobs
         FROM tier_rate_limits
         WHERE tier = ?",
    )
    .bind(tier)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| TierRateLimit {
        tier: row.get("tier"),
        pause_seconds: row.get("pause_seconds"),
        daily_limit: row.get("daily_limit"),
        monthly_limit: row.get("monthly_limit"),
        max_scheduled_jobs: row.get("max_scheduled_jobs"),
    }))
}

pub(crate) fn tenant_from_row(row: SqliteRow) -> Result<Tenant, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown tenant role `{role_raw}`")))?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = TenantStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown tenant status `{status_raw}`")))?;

    Ok(Tenant {
        id: TenantId(row.try_get("id")?),
        chat_id: row.try_get("chat_id")?,
        user_name: row.try_get("user_name")?,
        role,
        status,
        active: row.try_get::<i64, _>("active")? != 0,
        suspended: row.try_get::<i64, _>("suspended")? != 0,
        service_maintenance: row.try_get::<i64, _>("service_maintenance")? != 0,
        expire_at: parse_optional_timestamp("expire_at", row.try_get("expire_at")?)?,
        tier: row.try_get("tier")?,
        daily_usage: row.try_get("daily_usage")?,
        monthly_usage: row.try_get("monthly_usage")?,
        messages_count: row.try_get("messages_count")?,
        last_message_time: parse_optional_timestamp(
            "last_message_time",
            row.try_get("last_message_time")?,
        )?,
        llm_choice: row.try_get("llm_choice")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        joined_at: parse_optional_timestamp("joined_at", row.try_get("joined_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tollgate_core::domain::tenant::{NewTenant, Role, TenantIdentity, TenantStatus};
    use tollgate_core::DenialReason;

    use super::SqlTenantRepository;
    use crate::migrations;
    use crate::repositories::TenantRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn provision(chat_id: Option<i64>, user_name: Option<&str>) -> NewTenant {
        NewTenant {
            chat_id,
            user_name: user_name.map(str::to_string),
            ..NewTenant::default()
        }
    }

    #[tokio::test]
    async fn create_sanitizes_user_name_and_returns_existing_on_duplicate() {
        let pool = setup_pool().await;
        let repo = SqlTenantRepository::new(pool.clone());

        let created =
            repo.create(provision(None, Some("https://t.me/alice.99"))).await.expect("create");
        assert_eq!(created.user_name.as_deref(), Some("alice99"));
        assert_eq!(created.role, Role::User);
        assert_eq!(created.status, TenantStatus::Created);

        let duplicate = repo.create(provision(None, Some("alice99"))).await.expect("re-create");
        assert_eq!(duplicate.id, created.id);

        pool.close().await;
    }

    #[tokio::test]
    async fn authorize_unknown_identity_reports_no_such_tenant() {
        let pool = setup_pool().await;
        let repo = SqlTenantRepository::new(pool.clone());

        let decision =
            repo.authorize(&TenantIdentity::by_chat_id(404), Utc::now()).await.expect("authorize");
        assert!(!decision.allowed);
        assert_eq!(decision.denial, Some(DenialReason::NoSuchTenant));

        pool.close().await;
    }

    #[tokio::test]
    async fn first_contact_binds_chat_id_and_joins() {
        let pool = setup_pool().await;
        let repo = SqlTenantRepository::new(pool.clone());

        repo.create(provision(None, Some("bob"))).await.expect("provision");

        let identity = TenantIdentity { chat_id: Some(777), user_name: Some("bob".to_string()) };
        let decision = repo.authorize(&identity, Utc::now()).await.expect("authorize");
        assert!(decision.allowed);
        assert!(decision.first_interaction);

        let joined = repo
            .find_by_identity(&TenantIdentity::by_chat_id(777))
            .await
            .expect("find")
            .expect("tenant bound to chat id");
        assert_eq!(joined.status, TenantStatus::Joined);
        assert!(joined.active);
        assert_eq!(joined.messages_count, 1);
        assert!(joined.joined_at.is_some());

        pool.close().await;
    }

    #[tokio::test]
    async fn allowed_message_bumps_all_three_counters() {
        let pool = setup_pool().await;
        let repo = SqlTenantRepository::new(pool.clone());

        seed_joined_tenant(&pool, 100, 3).await;

        let decision =
            repo.authorize(&TenantIdentity::by_chat_id(100), Utc::now()).await.expect("authorize");
        assert!(decision.allowed);
        assert!(!decision.first_interaction);

        let tenant = repo
            .find_by_identity(&TenantIdentity::by_chat_id(100))
            .await
            .expect("find")
            .expect("tenant");
        assert_eq!(tenant.daily_usage, 1);
        assert_eq!(tenant.monthly_usage, 1);
        assert_eq!(tenant.messages_count, 1);
        assert!(tenant.last_message_time.is_some());

        pool.close().await;
    }

    #[tokio::test]
    async fn suspended_tenant_is_denied_without_mutation() {
        let pool = setup_pool().await;
        let repo = SqlTenantRepository::new(pool.clone());

        seed_joined_tenant(&pool, 200, 1).await;
        sqlx::query("UPDATE tenants SET suspended = 1 WHERE chat_id = 200")
            .execute(&pool)
            .await
            .expect("suspend");

        let decision =
            repo.authorize(&TenantIdentity::by_chat_id(200), Utc::now()).await.expect("authorize");
        assert_eq!(decision.denial, Some(DenialReason::Suspended));

        let tenant = repo
            .find_by_identity(&TenantIdentity::by_chat_id(200))
            .await
            .expect("find")
            .expect("tenant");
        assert_eq!(tenant.messages_count, 0);

        pool.close().await;
    }

    #[tokio::test]
    async fn usage_report_reflects_tier_caps() {
        let pool = setup_pool().await;
        let repo = SqlTenantRepository::new(pool.clone());

        seed_joined_tenant(&pool, 300, 2).await;
        sqlx::query("UPDATE tenants SET daily_usage = 42, monthly_usage = 99 WHERE chat_id = 300")
            .execute(&pool)
            .await
            .expect("set usage");

        let report = repo.usage_report(300).await.expect("report").expect("tenant exists");
        assert_eq!(report.tier, 2);
        assert_eq!(report.daily_usage, 42);
        assert_eq!(report.daily_limit, 500);
        assert_eq!(report.monthly_usage, 99);
        assert_eq!(report.monthly_limit, 10000);

        assert!(repo.usage_report(999).await.expect("report").is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn maintenance_flag_skips_admin_tenants() {
        let pool = setup_pool().await;
        let repo = SqlTenantRepository::new(pool.clone());

        seed_joined_tenant(&pool, 400, 1).await;
        seed_joined_tenant(&pool, 401, 1).await;
        sqlx::query("UPDATE tenants SET role = 'admin' WHERE chat_id = 401")
            .execute(&pool)
            .await
            .expect("promote admin");

        let affected = repo.set_service_maintenance(true).await.expect("set maintenance");
        assert_eq!(affected, 1);

        let admin = repo
            .find_by_identity(&TenantIdentity::by_chat_id(401))
            .await
            .expect("find")
            .expect("admin tenant");
        assert!(!admin.service_maintenance);

        pool.close().await;
    }

    #[tokio::test]
    async fn concurrent_authorizations_increment_exactly_once_each() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("concurrency.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());

        let pool = connect_with_settings(&url, 5, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        // Tier 3 has no pacing interval, so every attempt passes policy.
        seed_joined_tenant(&pool, 500, 3).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let task_pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let repo = SqlTenantRepository::new(task_pool);
                repo.authorize(&TenantIdentity::by_chat_id(500), Utc::now()).await
            }));
        }

        for handle in handles {
            let decision = handle.await.expect("join task").expect("authorize");
            assert!(decision.allowed);
        }

        let repo = SqlTenantRepository::new(pool.clone());
        let tenant = repo
            .find_by_identity(&TenantIdentity::by_chat_id(500))
            .await
            .expect("find")
            .expect("tenant");
        assert_eq!(tenant.daily_usage, 10);
        assert_eq!(tenant.monthly_usage, 10);
        assert_eq!(tenant.messages_count, 10);

        pool.close().await;
    }

    async fn seed_joined_tenant(pool: &DbPool, chat_id: i64, tier: i64) {
        sqlx::query(
            "INSERT INTO tenants (chat_id, role, status, active, tier, created_at, joined_at)
             VALUES (?, 'user', 'joined', 1, ?, ?, ?)",
        )
        .bind(chat_id)
        .bind(tier)
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .expect("seed tenant");
    }
}
