//! Extractors: node telemetry -> canonical facts
//!
//! Each extractor reads one concern out of a node's telemetry object and
//! writes it to the fact store. The registry runs them in a fixed order and
//! isolates failures: a failing extractor loses its own facts for that node
//! and nothing else.

mod config;
mod features;
mod metadata;
mod namespace_stats;
mod node_stats;
mod security;
mod system_info;

pub use config::ConfigExtractor;
pub use features::FeaturesExtractor;
pub use metadata::MetadataExtractor;
pub use namespace_stats::NamespaceStatsExtractor;
pub use node_stats::NodeStatsExtractor;
pub use security::SecurityExtractor;
pub use system_info::SystemInfoExtractor;

use crate::error::ExtractorError;
use bundlecheck_core::{FactStore, Lookup, RunContext};
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Storage-engine subtree of a node telemetry object
pub const ENGINE_SUBTREE: &str = "as_stat";
/// Operating-system subtree of a node telemetry object
pub const SYSTEM_SUBTREE: &str = "sys_stat";

/// A single normalization step over one node's telemetry
pub trait Extractor {
    fn name(&self) -> &'static str;

    fn extract(
        &self,
        node_id: &str,
        node: &Value,
        store: &FactStore,
        run: &RunContext,
    ) -> Result<(), ExtractorError>;
}

/// Per-node outcome of running the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeOutcome {
    pub succeeded: usize,
    pub failed: Vec<&'static str>,
}

/// Ordered extractor collection
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// The stock registry. Metadata runs first so cluster classification
    /// exists before per-node detail; feature discovery runs last because it
    /// reads back what the others wrote.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(MetadataExtractor));
        registry.register(Box::new(NodeStatsExtractor));
        registry.register(Box::new(NamespaceStatsExtractor));
        registry.register(Box::new(ConfigExtractor));
        registry.register(Box::new(SystemInfoExtractor));
        registry.register(Box::new(SecurityExtractor));
        registry.register(Box::new(FeaturesExtractor));
        registry
    }

    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Run every extractor against one node, each inside its own savepoint.
    /// A panicking extractor counts as failed and its writes are rolled back.
    pub fn run_node(
        &self,
        node_id: &str,
        node: &Value,
        store: &FactStore,
        run: &RunContext,
    ) -> NodeOutcome {
        let mut outcome = NodeOutcome::default();
        for extractor in &self.extractors {
            tracing::debug!(extractor = extractor.name(), node_id, "Running extractor");
            let result = store.isolated(|s| {
                panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(node_id, node, s, run)))
                    .unwrap_or_else(|payload| {
                        Err(ExtractorError::Panicked(panic_detail(payload.as_ref())))
                    })
            });
            match result {
                Ok(()) => outcome.succeeded += 1,
                Err(e) => {
                    tracing::warn!(
                        extractor = extractor.name(),
                        node_id,
                        error = %e,
                        "Extractor failed; its facts for this node were discarded"
                    );
                    outcome.failed.push(extractor.name());
                }
            }
        }
        outcome
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// The storage-engine subtree, if the node carries one
pub(crate) fn engine(node: &Value) -> Lookup<'_> {
    Lookup::at(node, &[ENGINE_SUBTREE])
}

/// Modern bundles nest statistics under `statistics`; legacy ones are flat
pub(crate) fn is_modern(engine: &Value) -> bool {
    engine.get("statistics").map_or(false, Value::is_object)
}

/// Namespace container: `statistics.namespace` (modern) or `namespaces` (legacy)
pub(crate) fn namespace_stats(engine: &Value) -> Lookup<'_> {
    Lookup::first_of(engine, &[&["statistics", "namespace"], &["namespaces"]])
}

/// Per-namespace configuration container: `config.namespace` (modern) or the
/// legacy flat `namespaces` block
pub(crate) fn namespace_configs(engine: &Value) -> Lookup<'_> {
    Lookup::first_of(engine, &[&["config", "namespace"], &["namespaces"]])
}

/// A namespace config setting, looked up in the nested `service` block first
pub(crate) fn namespace_setting<'a>(ns_conf: &'a Value, key: &str) -> Lookup<'a> {
    Lookup::at(ns_conf, &["service", key]).or(Lookup::at(ns_conf, &[key]))
}

/// Prefix a metric key with `service.` unless it already carries it
pub(crate) fn service_key(key: &str) -> String {
    if key.starts_with("service.") {
        key.to_string()
    } else {
        format!("service.{}", key)
    }
}
