use super::{CheckpointClearCounts, CheckpointRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCheckpointRepository {
    pool: DbPool,
}

impl SqlCheckpointRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CheckpointRepository for SqlCheckpointRepository {
    async fn clear_thread(
        &self,
        thread_id: i64,
    ) -> Result<CheckpointClearCounts, RepositoryError> {
        let checkpoints = sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let blobs = sqlx::query("DELETE FROM checkpoint_blobs WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let writes = sqlx::query("DELETE FROM checkpoint_writes WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(CheckpointClearCounts { checkpoints, blobs, writes })
    }
}
