use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::CoreError;

/// A table exposed by the pipe's data source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SourceTable {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SourceTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
        }
    }
}

/// A data pipe configuration bound to a connector.
///
/// `run` references the run currently executing for this pipe. It is the only
/// field the run engine ever writes; `revision` is bumped by the store on every
/// write and used for compare-and-swap updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PipeConfig {
    pub id: Uuid,
    pub name: String,
    pub connector_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<SourceTable>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_table_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<Uuid>,
    /// Connector specific settings (credentials, endpoints, ...)
    #[serde(default)]
    #[schema(value_type = Object)]
    pub settings: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipeConfig {
    pub fn new(name: impl Into<String>, connector_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            connector_id: connector_id.into(),
            tables: None,
            selected_table_id: None,
            run: None,
            settings: serde_json::Map::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = Some(tables.into_iter().map(SourceTable::new).collect());
        self
    }

    pub fn with_selected_table(mut self, table: impl Into<String>) -> Self {
        self.selected_table_id = Some(table.into());
        self
    }

    /// Check the fields every stored pipe must carry.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("Pipe name cannot be empty".to_string()));
        }
        if self.connector_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "Connector id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// A pipe is connected once its data source has reported at least one table.
    pub fn is_connected(&self) -> bool {
        self.tables.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Tables a run should process.
    ///
    /// When a table is selected only that table is returned, otherwise every
    /// table carrying a name.
    pub fn source_tables(&self) -> Vec<&SourceTable> {
        let Some(tables) = self.tables.as_ref() else {
            return Vec::new();
        };

        match self.selected_table_id.as_deref() {
            Some(selected) => tables.iter().filter(|t| t.name == selected).take(1).collect(),
            None => tables.iter().filter(|t| !t.name.is_empty()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_creation() {
        let pipe = PipeConfig::new("Orders", "sample");

        assert_eq!(pipe.name, "Orders");
        assert_eq!(pipe.connector_id, "sample");
        assert!(pipe.tables.is_none());
        assert!(pipe.run.is_none());
        assert_eq!(pipe.revision, 0);
    }

    #[test]
    fn test_validate() {
        assert!(PipeConfig::new("Orders", "sample").validate().is_ok());
        assert_eq!(
            PipeConfig::new("  ", "sample").validate(),
            Err(CoreError::Validation("Pipe name cannot be empty".to_string()))
        );
        assert!(PipeConfig::new("Orders", "").validate().is_err());
    }

    #[test]
    fn test_is_connected() {
        assert!(!PipeConfig::new("p", "c").is_connected());
        assert!(!PipeConfig::new("p", "c")
            .with_tables(Vec::<String>::new())
            .is_connected());
        assert!(PipeConfig::new("p", "c").with_tables(["a"]).is_connected());
    }

    #[test]
    fn test_source_tables_skips_unnamed() {
        let pipe = PipeConfig::new("p", "c").with_tables(["orders", "", "customers"]);
        let names: Vec<&str> = pipe.source_tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["orders", "customers"]);
    }

    #[test]
    fn test_source_tables_with_selection() {
        let pipe = PipeConfig::new("p", "c")
            .with_tables(["orders", "customers"])
            .with_selected_table("customers");
        let tables = pipe.source_tables();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "customers");
    }

    #[test]
    fn test_source_tables_unknown_selection() {
        let pipe = PipeConfig::new("p", "c")
            .with_tables(["orders"])
            .with_selected_table("missing");
        assert!(pipe.source_tables().is_empty());
    }

    #[test]
    fn test_pipe_deserialize_minimal() {
        let json = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "name": "Orders",
            "connector_id": "sample",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let pipe: PipeConfig = serde_json::from_str(json).unwrap();
        assert!(pipe.tables.is_none());
        assert!(pipe.settings.is_empty());
        assert_eq!(pipe.revision, 0);
    }
}
