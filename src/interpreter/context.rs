//! Execution context
//!
//! Everything an interpreter needs besides the query itself. A context is
//! cheap to clone; nested interpreters get a derived copy one level deeper.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::Settings;
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::storage::Catalog;

pub const DEFAULT_DATABASE: &str = "default";

#[derive(Clone)]
pub struct Context {
    settings: Arc<Settings>,
    catalog: Arc<Catalog>,
    current_database: String,
    query_id: String,
    metrics: Arc<MetricsRegistry>,
    logger: Logger,
    /// Subquery nesting level, 0 for the top-level query
    depth: usize,
}

impl Context {
    /// Top-level context with a fresh query id
    pub fn new(settings: Settings, catalog: Arc<Catalog>) -> Self {
        let query_id = Uuid::new_v4().to_string();
        let logger = Logger::new(settings.log_level).for_query(query_id.clone());
        Self {
            settings: Arc::new(settings),
            catalog,
            current_database: DEFAULT_DATABASE.to_string(),
            query_id,
            metrics: Arc::new(MetricsRegistry::new()),
            logger,
            depth: 0,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.current_database = database.into();
        self
    }

    /// Same context counting into an existing registry
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Same query resolving tables in another catalog (a shard)
    pub fn with_catalog(&self, catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            ..self.clone()
        }
    }

    /// Context for a subquery, one level deeper
    pub fn nested(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self.clone()
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn current_database(&self) -> &str {
        &self.current_database
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Logs a lifecycle event at its own severity
    pub fn log(&self, event: Event, fields: &[(&str, &str)]) {
        self.logger.log(event.severity(), event.as_str(), fields);
    }
}
