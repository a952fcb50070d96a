//! Per-namespace and per-set statistics

use super::{engine, namespace_stats, service_key, Extractor};
use crate::error::ExtractorError;
use bundlecheck_core::flatten::{flatten, leaf_text};
use bundlecheck_core::{
    FactSource, FactStore, Lookup, NamespaceMetricFact, RunContext, SetMetricFact,
};
use serde_json::Value;

pub struct NamespaceStatsExtractor;

impl NamespaceStatsExtractor {
    /// `(metric_key, value)` pairs for one namespace, keyed under `service.`
    pub fn namespace_pairs(ns_data: &Value) -> Vec<(String, String)> {
        let source = match ns_data.get("service") {
            Some(service) if service.is_object() => service,
            _ => ns_data,
        };
        flatten(source)
            .into_iter()
            .map(|(k, v)| (service_key(&k), v))
            .collect()
    }
}

impl Extractor for NamespaceStatsExtractor {
    fn name(&self) -> &'static str {
        "namespace_stats"
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

        let mut ns_facts = Vec::new();
        if let Some(namespaces) = namespace_stats(engine).object() {
            for (namespace, ns_data) in namespaces {
                if !ns_data.is_object() {
                    tracing::warn!(node_id, namespace, "Skipping non-object namespace block");
                    continue;
                }
                ns_facts.extend(Self::namespace_pairs(ns_data).into_iter().map(
                    |(metric_key, value)| NamespaceMetricFact {
                        node_id: node_id.to_string(),
                        namespace: namespace.clone(),
                        metric_key,
                        value,
                        source: FactSource::Statistic,
                    },
                ));
            }
        }
        store.insert_namespace_metrics(run, &ns_facts)?;

        let mut set_facts = Vec::new();
        if let Some(by_namespace) = Lookup::at(engine, &["statistics", "set"]).object() {
            for (namespace, sets) in by_namespace {
                let Some(sets) = sets.as_object() else {
                    continue;
                };
                for (set_name, metrics) in sets {
                    let Some(metrics) = metrics.as_object() else {
                        continue;
                    };
                    set_facts.extend(metrics.iter().map(|(key, value)| SetMetricFact {
                        node_id: node_id.to_string(),
                        namespace: namespace.clone(),
                        set_name: set_name.clone(),
                        key: key.clone(),
                        value: leaf_text(value),
                    }));
                }
            }
        }
        store.upsert_set_metrics(run, &set_facts)?;

        tracing::debug!(
            node_id,
            namespace_rows = ns_facts.len(),
            set_rows = set_facts.len(),
            "Namespace metrics written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_modern_namespace_and_sets() {
        let store = FactStore::open_in_memory().unwrap();
        let run = RunContext::new("t.tgz");
        let node = json!({"as_stat": {"statistics": {
            "namespace": {"test": {"service": {"data_used_pct": 42, "objects": 10}}},
            "set": {"test": {"users": {"objects": 500, "tombstones": 0}}}
        }}});

        NamespaceStatsExtractor.extract("n1", &node, &store, &run).unwrap();

        let rows = store.namespace_metrics(&["service.data_used_pct"]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].namespace, "test");
        assert_eq!(rows[0].value, "42");

        let sets = store.set_metrics("objects").unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].set_name, "users");
    }

    #[test]
    fn test_legacy_namespaces_key() {
        let legacy = json!({"data_used_pct": 12, "service.memory_used_pct": 3});
        assert_eq!(
            NamespaceStatsExtractor::namespace_pairs(&legacy),
            vec![
                ("service.data_used_pct".to_string(), "12".to_string()),
                ("service.memory_used_pct".to_string(), "3".to_string()),
            ]
        );
    }
}
