//! Registries for source adapters and exporters.
//!
//! Both are plain keyed lookup tables populated at startup:
//! - [`SourceRegistry`] maps a source id to a factory that builds a fresh,
//!   unshared adapter per job
//! - [`ExporterRegistry`] maps a destination id to a shared exporter instance
//!
//! # Example
//!
//! ```ignore
//! let mut sources = SourceRegistry::new();
//! sources.register("listings", || Box::new(MyAdapter::new()));
//!
//! let mut exporters = ExporterRegistry::new();
//! exporters.register("memory", Arc::new(MemoryExporter::new()));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::traits::{adapter::SourceAdapter, exporter::Exporter};

/// Builds a new adapter instance. Called once per job.
pub type SourceFactory = Arc<dyn Fn() -> Box<dyn SourceAdapter> + Send + Sync>;

/// Registry that maps source ids to adapter factories.
///
/// Handing out a fresh instance per job means concurrent jobs never share
/// adapter state, even when they target the same source.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    factories: HashMap<String, SourceFactory>,
}

impl SourceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a source id. Replaces any previous registration.
    pub fn register<F>(&mut self, source_id: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn SourceAdapter> + Send + Sync + 'static,
    {
        self.factories.insert(source_id.into(), Arc::new(factory));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, source_id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn SourceAdapter> + Send + Sync + 'static,
    {
        self.register(source_id, factory);
        self
    }

    /// Build an isolated adapter instance for `source_id`.
    pub fn instantiate(&self, source_id: &str) -> Result<Box<dyn SourceAdapter>> {
        self.factories
            .get(source_id)
            .map(|factory| factory())
            .ok_or_else(|| EngineError::UnknownSource(source_id.to_string()))
    }

    /// Check if a source id is registered.
    pub fn is_registered(&self, source_id: &str) -> bool {
        self.factories.contains_key(source_id)
    }

    /// All registered source ids, sorted.
    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Registry that maps destination ids to exporters.
#[derive(Default, Clone)]
pub struct ExporterRegistry {
    exporters: HashMap<String, Arc<dyn Exporter>>,
}

impl ExporterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an exporter under a destination id.
    pub fn register(&mut self, destination: impl Into<String>, exporter: Arc<dyn Exporter>) {
        self.exporters.insert(destination.into(), exporter);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, destination: impl Into<String>, exporter: Arc<dyn Exporter>) -> Self {
        self.register(destination, exporter);
        self
    }

    pub fn get(&self, destination: &str) -> Option<Arc<dyn Exporter>> {
        self.exporters.get(destination).cloned()
    }

    /// Resolve destination ids in request order.
    ///
    /// Fails on the first unknown id so a bad request is rejected before any
    /// job is created.
    pub fn resolve(&self, destinations: &[String]) -> Result<Vec<(String, Arc<dyn Exporter>)>> {
        destinations
            .iter()
            .map(|id| {
                self.get(id)
                    .map(|exporter| (id.clone(), exporter))
                    .ok_or_else(|| EngineError::UnknownExporter(id.clone()))
            })
            .collect()
    }

    /// Check if a destination id is registered.
    pub fn is_registered(&self, destination: &str) -> bool {
        self.exporters.contains_key(destination)
    }

    /// All registered destination ids, sorted.
    pub fn destination_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.exporters.keys().cloned().collect();
        ids.sort();
        ids
    }
}
