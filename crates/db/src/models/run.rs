use pipes_core::RunDocument;

use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub id: String,
    pub pipe_id: String,
    pub status: String,
    pub document: String,
    pub start_time: i64,
}

impl RunRow {
    pub fn into_domain(self) -> Result<RunDocument, DbError> {
        Ok(serde_json::from_str(&self.document)?)
    }

    pub fn try_from_domain(run: &RunDocument) -> Result<Self, DbError> {
        Ok(Self {
            id: run.id.to_string(),
            pipe_id: run.pipe_id.to_string(),
            status: run.status.as_str().to_string(),
            document: serde_json::to_string(run)?,
            start_time: run.start_time.timestamp_millis(),
        })
    }
}
