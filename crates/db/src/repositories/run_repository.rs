use crate::error::DbError;
use crate::models::{Attachment, RunRow};
use chrono::Utc;
use pipes_core::RunDocument;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Clone)]
pub struct RunRepository {
    pool: SqlitePool,
}

impl RunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or fully replace a run document. Last write wins.
    pub async fn save(&self, run: &RunDocument) -> Result<(), DbError> {
        let row = RunRow::try_from_domain(run)?;

        sqlx::query(
            r#"
            INSERT INTO runs (id, pipe_id, status, document, start_time)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                document = excluded.document,
                start_time = excluded.start_time
            "#,
        )
        .bind(&row.id)
        .bind(&row.pipe_id)
        .bind(&row.status)
        .bind(&row.document)
        .bind(row.start_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RunDocument>, DbError> {
        let row: Option<RunRow> = sqlx::query_as(
            r#"
            SELECT id, pipe_id, status, document, start_time
            FROM runs
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    /// Most recent runs across all pipes, newest first.
    pub async fn find_recent(&self, limit: u32) -> Result<Vec<RunDocument>, DbError> {
        let rows: Vec<RunRow> = sqlx::query_as(
            r#"
            SELECT id, pipe_id, status, document, start_time
            FROM runs
            ORDER BY start_time DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    pub async fn find_by_pipe(&self, pipe_id: Uuid, limit: u32) -> Result<Vec<RunDocument>, DbError> {
        let rows: Vec<RunRow> = sqlx::query_as(
            r#"
            SELECT id, pipe_id, status, document, start_time
            FROM runs
            WHERE pipe_id = ?
            ORDER BY start_time DESC
            LIMIT ?
            "#,
        )
        .bind(pipe_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    /// Store (or replace) a named attachment on a run.
    pub async fn attach(
        &self,
        run_id: Uuid,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO run_attachments (run_id, name, content_type, data, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(run_id, name) DO UPDATE SET
                content_type = excluded.content_type,
                data = excluded.data,
                created_at = excluded.created_at
            "#,
        )
        .bind(run_id.to_string())
        .bind(name)
        .bind(content_type)
        .bind(data)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_attachment(
        &self,
        run_id: Uuid,
        name: &str,
    ) -> Result<Option<Attachment>, DbError> {
        let attachment = sqlx::query_as::<_, Attachment>(
            r#"
            SELECT run_id, name, content_type, data, created_at
            FROM run_attachments
            WHERE run_id = ? AND name = ?
            "#,
        )
        .bind(run_id.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attachment)
    }
}
