//! Connectors and the registry they are resolved from.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pipes_core::PipeConfig;
use serde::Serialize;

use crate::error::StepError;
use crate::step::Step;

/// A data source type: supplies the steps of a run and lifecycle hooks around them.
#[async_trait]
pub trait Connector: Send + Sync {
    fn id(&self) -> &str;

    fn label(&self) -> &str {
        self.id()
    }

    /// Steps to run for `pipe`, in order.
    fn steps(&self, pipe: &PipeConfig) -> Vec<Arc<dyn Step>>;

    /// Called once the run is RUNNING, before the first step. An error ends the run.
    async fn run_started(&self, _pipe: &PipeConfig) -> Result<(), StepError> {
        Ok(())
    }

    /// Called after the last executed step, with the error that stopped the run if any.
    async fn run_finished(&self, _pipe: &PipeConfig, _error: Option<&StepError>) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConnectorInfo {
    pub id: String,
    pub label: String,
}

/// Connectors by id, built at startup.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector, replacing any previous one with the same id.
    pub fn register(&mut self, connector: Arc<dyn Connector>) -> Option<Arc<dyn Connector>> {
        tracing::debug!(connector_id = %connector.id(), "Registering connector");
        self.connectors
            .insert(connector.id().to_string(), connector)
    }

    pub fn with(mut self, connector: Arc<dyn Connector>) -> Self {
        self.register(connector);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connectors.contains_key(id)
    }

    /// Descriptors of all registered connectors, sorted by id.
    pub fn list(&self) -> Vec<ConnectorInfo> {
        let mut infos: Vec<ConnectorInfo> = self
            .connectors
            .values()
            .map(|c| ConnectorInfo {
                id: c.id().to_string(),
                label: c.label().to_string(),
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.connectors.keys().collect();
        ids.sort();
        f.debug_struct("ConnectorRegistry")
            .field("connectors", &ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        id: &'static str,
        label: Option<&'static str>,
    }

    #[async_trait]
    impl Connector for Named {
        fn id(&self) -> &str {
            self.id
        }

        fn label(&self) -> &str {
            self.label.unwrap_or(self.id)
        }

        fn steps(&self, _pipe: &PipeConfig) -> Vec<Arc<dyn Step>> {
            Vec::new()
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = ConnectorRegistry::new().with(Arc::new(Named {
            id: "postgres",
            label: Some("PostgreSQL"),
        }));

        assert!(registry.contains("postgres"));
        assert_eq!(registry.get("postgres").unwrap().label(), "PostgreSQL");
        assert!(registry.get("mysql").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ConnectorRegistry::new();
        assert!(registry
            .register(Arc::new(Named { id: "s3", label: None }))
            .is_none());
        assert!(registry
            .register(Arc::new(Named { id: "s3", label: Some("Amazon S3") }))
            .is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_sorted() {
        let registry = ConnectorRegistry::new()
            .with(Arc::new(Named { id: "s3", label: None }))
            .with(Arc::new(Named { id: "postgres", label: Some("PostgreSQL") }));

        assert_eq!(
            registry.list(),
            vec![
                ConnectorInfo {
                    id: "postgres".into(),
                    label: "PostgreSQL".into()
                },
                ConnectorInfo {
                    id: "s3".into(),
                    label: "s3".into()
                },
            ]
        );
    }
}
