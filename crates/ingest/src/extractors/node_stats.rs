//! Service-level node statistics and build metadata

use super::{engine, is_modern, service_key, Extractor};
use crate::error::ExtractorError;
use bundlecheck_core::flatten::{flatten, flatten_prefixed, leaf_text};
use bundlecheck_core::{FactSource, FactStore, Lookup, NodeMetricFact, RunContext};
use serde_json::Value;

pub struct NodeStatsExtractor;

impl NodeStatsExtractor {
    /// `(metric_key, value)` pairs for the node's service statistics
    pub fn service_pairs(engine: &Value) -> Vec<(String, String)> {
        let pairs = if is_modern(engine) {
            match Lookup::at(engine, &["statistics", "service"]).value() {
                Some(service) => flatten(service),
                None => Vec::new(),
            }
        } else if let Some(service) = engine.get("service").filter(|v| v.is_object()) {
            flatten(service)
        } else {
            // Legacy flat shape: service counters sit at the root beside
            // the config and namespace objects.
            engine
                .as_object()
                .map(|root| {
                    root.iter()
                        .filter(|(_, v)| !v.is_object())
                        .map(|(k, v)| (k.clone(), leaf_text(v)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut pairs: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (service_key(&k), v))
            .collect();
        pairs.sort();
        pairs
    }
}

impl Extractor for NodeStatsExtractor {
    fn name(&self) -> &'static str {
        "node_stats"
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

        let mut pairs = Self::service_pairs(engine);
        if let Some(meta) = engine.get("meta_data") {
            pairs.extend(flatten_prefixed(meta, "meta_data"));
        }

        let facts: Vec<NodeMetricFact> = pairs
            .into_iter()
            .map(|(metric_key, value)| NodeMetricFact {
                node_id: node_id.to_string(),
                metric_key,
                value,
                source: FactSource::Statistic,
            })
            .collect();

        let written = store.insert_node_metrics(run, &facts)?;
        tracing::debug!(node_id, written, "Node metrics written");
        Ok(())
    }
}
