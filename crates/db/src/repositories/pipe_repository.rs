use crate::error::DbError;
use crate::models::PipeRow;
use chrono::Utc;
use pipes_core::PipeConfig;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PipeRepository {
    pool: SqlitePool,
}

impl PipeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a pipe. The stored revision is bumped on every write.
    pub async fn save(&self, pipe: &PipeConfig) -> Result<PipeConfig, DbError> {
        let mut pipe = pipe.clone();
        pipe.updated_at = Utc::now();
        let row = PipeRow::try_from_domain(&pipe)?;

        let revision: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO pipes (id, name, connector_id, document, revision, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                connector_id = excluded.connector_id,
                document = excluded.document,
                revision = pipes.revision + 1,
                updated_at = excluded.updated_at
            RETURNING revision
            "#,
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.connector_id)
        .bind(&row.document)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&self.pool)
        .await?;

        pipe.revision = revision.0;
        Ok(pipe)
    }

    /// Write `pipe` only if the stored revision still equals `pipe.revision`.
    ///
    /// Returns the stored pipe with its new revision, or `None` when another
    /// writer got there first.
    pub async fn update_if_revision(
        &self,
        pipe: &PipeConfig,
    ) -> Result<Option<PipeConfig>, DbError> {
        let mut pipe = pipe.clone();
        pipe.updated_at = Utc::now();
        let expected = pipe.revision;
        let row = PipeRow::try_from_domain(&pipe)?;

        let result = sqlx::query(
            r#"
            UPDATE pipes
            SET name = ?, connector_id = ?, document = ?, revision = revision + 1, updated_at = ?
            WHERE id = ? AND revision = ?
            "#,
        )
        .bind(&row.name)
        .bind(&row.connector_id)
        .bind(&row.document)
        .bind(row.updated_at)
        .bind(&row.id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        pipe.revision = expected + 1;
        Ok(Some(pipe))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PipeConfig>, DbError> {
        let row: Option<PipeRow> = sqlx::query_as(
            r#"
            SELECT id, name, connector_id, document, revision, created_at, updated_at
            FROM pipes
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    pub async fn find_all(&self) -> Result<Vec<PipeConfig>, DbError> {
        let rows: Vec<PipeRow> = sqlx::query_as(
            r#"
            SELECT id, name, connector_id, document, revision, created_at, updated_at
            FROM pipes
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM pipes WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
