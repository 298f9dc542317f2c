//! Built-in `sample` connector.
//!
//! Generates no data of its own: its single step reports a fixed number of
//! records per source table, so pipes can be run end to end without a real
//! data source.

use std::sync::Arc;

use async_trait::async_trait;
use orchestrator::{Connector, Step, StepContext, StepError};
use pipes_core::{PipeConfig, TableStats};

pub const SAMPLE_CONNECTOR_ID: &str = "sample";

/// Pipe setting overriding the number of records reported per table.
pub const ROWS_PER_TABLE_SETTING: &str = "rows_per_table";

const DEFAULT_ROWS_PER_TABLE: u64 = 100;

pub struct SampleConnector;

#[async_trait]
impl Connector for SampleConnector {
    fn id(&self) -> &str {
        SAMPLE_CONNECTOR_ID
    }

    fn label(&self) -> &str {
        "Sample data"
    }

    fn steps(&self, pipe: &PipeConfig) -> Vec<Arc<dyn Step>> {
        let rows = pipe
            .settings
            .get(ROWS_PER_TABLE_SETTING)
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_ROWS_PER_TABLE);
        vec![Arc::new(SampleTablesStep { rows })]
    }
}

struct SampleTablesStep {
    rows: u64,
}

#[async_trait]
impl Step for SampleTablesStep {
    fn label(&self) -> &str {
        "Sample tables"
    }

    async fn run(&self, ctx: &StepContext) -> Result<(), StepError> {
        let tables = ctx.source_tables();
        for table in &tables {
            ctx.run.set_message(format!("Sampling {}", table.name));
            ctx.run.add_table_stats(
                TableStats::new(&table.name)
                    .with_records(self.rows)
                    .with_field("connector", SAMPLE_CONNECTOR_ID),
            );
        }
        tracing::debug!(run_id = %ctx.run_id(), tables = tables.len(), "Sample tables recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::SqliteStore;
    use events::EventBus;
    use orchestrator::{ConnectorRegistry, EngineConfig, RunEngine};
    use pipes_core::RunStatus;
    use serde_json::json;
    use tempfile::TempDir;

    async fn engine(log_dir: &std::path::Path) -> RunEngine {
        let pool = db::create_memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        RunEngine::new(
            Arc::new(SqliteStore::new(pool)),
            EventBus::new(),
            ConnectorRegistry::new().with(Arc::new(SampleConnector)),
            EngineConfig::default().with_log_dir(log_dir),
        )
    }

    #[test]
    fn test_rows_per_table_setting() {
        let mut pipe = PipeConfig::new("Orders", SAMPLE_CONNECTOR_ID);
        assert_eq!(SampleConnector.steps(&pipe).len(), 1);

        pipe.settings.insert(ROWS_PER_TABLE_SETTING.to_string(), json!("lots"));
        assert_eq!(SampleConnector.steps(&pipe)[0].label(), "Sample tables");
    }

    #[tokio::test]
    async fn test_sample_run_records_selected_table() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path()).await;

        let mut pipe = PipeConfig::new("Orders", SAMPLE_CONNECTOR_ID)
            .with_tables(["orders", "customers"])
            .with_selected_table("customers");
        pipe.settings.insert(ROWS_PER_TABLE_SETTING.to_string(), json!(7));
        engine.store().save_pipe(&pipe).await.unwrap();

        let doc = engine.new_run(&pipe).await.unwrap().wait().await;

        assert_eq!(doc.status, RunStatus::Finished);
        assert_eq!(doc.num_records, 7);
        assert!(doc.table_stats.contains_key("customers"));
        assert!(!doc.table_stats.contains_key("orders"));
    }
}
