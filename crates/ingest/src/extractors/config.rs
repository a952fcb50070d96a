//! Runtime configuration facts
//!
//! Modern bundles carry a dedicated `config` block. Legacy bundles mix
//! configuration objects into the statistics root, so only the object
//! branches that are not statistics, metadata or namespaces are taken there.

use super::{engine, Extractor};
use crate::error::ExtractorError;
use bundlecheck_core::flatten::{flatten_excluding, flatten_prefixed};
use bundlecheck_core::{ConfigFact, FactSource, FactStore, RunContext};
use serde_json::Value;
use std::collections::BTreeSet;

/// Branches that hold telemetry, never configuration
pub const NON_CONFIG_BRANCHES: &[&str] = &["statistics", "meta_data", "histogram", "latency"];

/// Additional legacy root branches owned by other extractors
const LEGACY_OWNED_BRANCHES: &[&str] = &["namespaces", "service", "acl"];

pub struct ConfigExtractor;

impl ConfigExtractor {
    pub fn config_pairs(engine: &Value) -> Vec<(String, String)> {
        if let Some(config) = engine.get("config").filter(|v| v.is_object()) {
            return flatten_excluding(config, None, NON_CONFIG_BRANCHES);
        }

        let Some(root) = engine.as_object() else {
            return Vec::new();
        };
        let mut pairs = Vec::new();
        for (key, value) in root {
            if !value.is_object()
                || NON_CONFIG_BRANCHES.contains(&key.as_str())
                || LEGACY_OWNED_BRANCHES.contains(&key.as_str())
            {
                continue;
            }
            pairs.extend(flatten_prefixed(value, key));
        }
        pairs.sort();
        pairs
    }

    /// Top-level configuration sections present on the node, empty ones included
    pub fn config_branches(engine: &Value) -> BTreeSet<String> {
        if let Some(config) = engine.get("config").and_then(Value::as_object) {
            return config
                .iter()
                .filter(|(key, value)| value.is_object() && !NON_CONFIG_BRANCHES.contains(&key.as_str()))
                .map(|(key, _)| key.clone())
                .collect();
        }
        engine
            .as_object()
            .into_iter()
            .flatten()
            .filter(|(key, value)| {
                value.is_object()
                    && !NON_CONFIG_BRANCHES.contains(&key.as_str())
                    && !LEGACY_OWNED_BRANCHES.contains(&key.as_str())
            })
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl Extractor for ConfigExtractor {
    fn name(&self) -> &'static str {
        "config"
    }

    fn extract(
        &self,
        node_id: &str,
        node: &Value,
        store: &FactStore,
        run: &RunContext,
    ) -> Result<(), ExtractorError> {
        let Some(engine) = engine(node).value() else {
            return Ok(());
        };

        let facts: Vec<ConfigFact> = Self::config_pairs(engine)
            .into_iter()
            .map(|(config_name, value)| ConfigFact {
                node_id: node_id.to_string(),
                config_name,
                value,
                source: FactSource::Config,
            })
            .collect();

        let written = store.insert_node_configs(run, &facts)?;
        tracing::debug!(node_id, written, "Config facts written");
        Ok(())
    }
}
