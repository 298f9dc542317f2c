use chrono::{DateTime, TimeZone, Utc};
use pipes_core::PipeConfig;

use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PipeRow {
    pub id: String,
    pub name: String,
    pub connector_id: String,
    pub document: String,
    pub revision: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PipeRow {
    pub fn into_domain(self) -> Result<PipeConfig, DbError> {
        let mut pipe: PipeConfig = serde_json::from_str(&self.document)?;
        // Columns are authoritative for the fields the store maintains itself
        pipe.revision = self.revision;
        pipe.created_at = timestamp_to_datetime(self.created_at);
        pipe.updated_at = timestamp_to_datetime(self.updated_at);
        Ok(pipe)
    }

    pub fn try_from_domain(pipe: &PipeConfig) -> Result<Self, DbError> {
        Ok(Self {
            id: pipe.id.to_string(),
            name: pipe.name.clone(),
            connector_id: pipe.connector_id.clone(),
            document: serde_json::to_string(pipe)?,
            revision: pipe.revision,
            created_at: pipe.created_at.timestamp(),
            updated_at: pipe.updated_at.timestamp(),
        })
    }
}

fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_row_round_trip_keeps_tables() {
        let pipe = PipeConfig::new("Orders", "sample").with_tables(["orders", "customers"]);
        let mut row = PipeRow::try_from_domain(&pipe).unwrap();
        row.revision = 7;

        let back = row.into_domain().unwrap();
        assert_eq!(back.id, pipe.id);
        assert_eq!(back.tables, pipe.tables);
        assert_eq!(back.revision, 7);
    }
}
