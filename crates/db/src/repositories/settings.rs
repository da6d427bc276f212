use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tollgate_core::domain::settings::ServerSettings;

use super::{parse_timestamp, RepositoryError, SettingsRepository};
use crate::DbPool;

pub struct SqlSettingsRepository {
    pool: DbPool,
}

impl SqlSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SettingsRepository for SqlSettingsRepository {
    async fn current(&self) -> Result<Option<ServerSettings>, RepositoryError> {
        let row = sqlx::query(
            "SELECT version, callback_secret, invoker_base_url, allowed_models, created_at
             FROM server_settings
             ORDER BY version DESC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(settings_from_row).transpose()
    }

    async fn insert_version(
        &self,
        callback_secret: &str,
        invoker_base_url: &str,
        allowed_models: &[String],
    ) -> Result<ServerSettings, RepositoryError> {
        let models_json = serde_json::to_string(allowed_models)
            .map_err(|error| RepositoryError::Decode(format!("allowed_models encode: {error}")))?;
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO server_settings (callback_secret, invoker_base_url, allowed_models, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(callback_secret)
        .bind(invoker_base_url)
        .bind(&models_json)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(ServerSettings {
            version: result.last_insert_rowid(),
            callback_secret: callback_secret.to_string().into(),
            invoker_base_url: invoker_base_url.to_string(),
            allowed_models: allowed_models.to_vec(),
            created_at: now,
        })
    }
}

fn settings_from_row(row: SqliteRow) -> Result<ServerSettings, RepositoryError> {
    let models_raw = row.try_get::<String, _>("allowed_models")?;
    let allowed_models: Vec<String> = serde_json::from_str(&models_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid allowed_models JSON `{models_raw}`: {error}"))
    })?;

    Ok(ServerSettings {
        version: row.try_get("version")?,
        callback_secret: row.try_get::<String, _>("callback_secret")?.into(),
        invoker_base_url: row.try_get("invoker_base_url")?,
        allowed_models,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::SqlSettingsRepository;
    use crate::migrations;
    use crate::repositories::SettingsRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn current_is_none_until_a_version_exists() {
        let pool = setup_pool().await;
        let repo = SqlSettingsRepository::new(pool.clone());

        assert!(repo.current().await.expect("read current").is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn highest_version_wins() {
        let pool = setup_pool().await;
        let repo = SqlSettingsRepository::new(pool.clone());

        repo.insert_version("secret-1", "http://invoker:8001", &["model-a".to_string()])
            .await
            .expect("insert v1");
        let second = repo
            .insert_version(
                "secret-2",
                "http://invoker:8001",
                &["model-a".to_string(), "model-b".to_string()],
            )
            .await
            .expect("insert v2");

        let current = repo.current().await.expect("read current").expect("settings exist");
        assert_eq!(current.version, second.version);
        assert_eq!(current.callback_secret.expose_secret(), "secret-2");
        assert_eq!(current.allowed_models, vec!["model-a", "model-b"]);
        assert!(current.model_allowed("model-b"));
        assert!(!current.model_allowed("model-c"));

        pool.close().await;
    }
}
