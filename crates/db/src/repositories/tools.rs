use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tollgate_core::domain::tools::Tool;

use super::{RepositoryError, ToolsRepository};
use crate::DbPool;

pub struct SqlToolsRepository {
    pool: DbPool,
}

impl SqlToolsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ToolsRepository for SqlToolsRepository {
    async fn available_for_tier(&self, tier: i64) -> Result<Vec<Tool>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT name, description, min_tier
             FROM tools
             WHERE min_tier <= ?
             ORDER BY name ASC",
        )
        .bind(tier)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(tool_from_row).collect())
    }

    async fn find(&self, name: &str) -> Result<Option<Tool>, RepositoryError> {
        let row = sqlx::query("SELECT name, description, min_tier FROM tools WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(tool_from_row))
    }
}

fn tool_from_row(row: SqliteRow) -> Tool {
    Tool {
        name: row.get("name"),
        description: row.get("description"),
        min_tier: row.get("min_tier"),
    }
}

#[cfg(test)]
mod tests {
    use super::SqlToolsRepository;
    use crate::migrations;
    use crate::repositories::ToolsRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO tools (name, description, min_tier) VALUES
                ('web_search', 'search the web', 0),
                ('image_gen', 'generate images', 2),
                ('deep_research', 'long-running research', 3)",
        )
        .execute(&pool)
        .await
        .expect("seed tools");

        pool
    }

    #[tokio::test]
    async fn catalog_is_filtered_by_tier() {
        let pool = setup_pool().await;
        let repo = SqlToolsRepository::new(pool.clone());

        let tier_one = repo.available_for_tier(1).await.expect("list tier 1");
        assert_eq!(tier_one.len(), 1);
        assert_eq!(tier_one[0].name, "web_search");

        let tier_three = repo.available_for_tier(3).await.expect("list tier 3");
        assert_eq!(tier_three.len(), 3);

        pool.close().await;
    }

    #[tokio::test]
    async fn find_returns_gate_for_named_tool() {
        let pool = setup_pool().await;
        let repo = SqlToolsRepository::new(pool.clone());

        let tool = repo.find("image_gen").await.expect("find").expect("tool exists");
        assert_eq!(tool.min_tier, 2);
        assert!(tool.accessible_by(2));
        assert!(!tool.accessible_by(1));

        assert!(repo.find("missing").await.expect("find").is_none());

        pool.close().await;
    }
}
