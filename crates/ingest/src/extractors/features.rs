//! Capability discovery from already-stored facts
//!
//! Runs after the statistics and config extractors and reads their output
//! for this node back from the store, so a capability is only claimed when
//! the evidence actually made it into the fact model.

use super::{engine, ConfigExtractor, Extractor};
use crate::error::ExtractorError;
use bundlecheck_core::{as_number, FactStore, FactTable, FeatureFact, RunContext};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Stored facts for one node, keyed the way the extractors wrote them
#[derive(Debug, Default)]
pub struct NodeEvidence {
    service: HashMap<String, String>,
    namespaces: Vec<(String, String, String)>,
    configs: HashMap<String, String>,
    config_branches: BTreeSet<String>,
}

impl NodeEvidence {
    pub fn load(store: &FactStore, node_id: &str) -> Result<Self, ExtractorError> {
        let mut evidence = Self::default();
        if store.has_table(FactTable::NodeMetrics.name())? {
            evidence.service = store
                .node_metrics_for(node_id)?
                .into_iter()
                .map(|f| (f.metric_key, f.value))
                .collect();
        }
        if store.has_table(FactTable::NamespaceMetrics.name())? {
            evidence.namespaces = store
                .namespace_metrics_for(node_id)?
                .into_iter()
                .map(|f| (f.namespace, f.metric_key, f.value))
                .collect();
        }
        if store.has_table(FactTable::NodeConfigs.name())? {
            evidence.configs = store
                .node_configs_for(node_id)?
                .into_iter()
                .map(|f| (f.config_name, f.value))
                .collect();
        }
        Ok(evidence)
    }

    /// Record which config sections the node declares, read from the raw
    /// node since an empty section leaves no flattened facts behind
    pub fn with_config_branches(mut self, node: &Value) -> Self {
        self.config_branches = engine(node)
            .value()
            .map(ConfigExtractor::config_branches)
            .unwrap_or_default();
        self
    }

    /// Any of the `service.` counters is above zero
    fn stat_gt_zero(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| {
            self.service
                .get(&format!("service.{}", k))
                .and_then(|v| as_number(v))
                .map_or(false, |n| n > 0.0)
        })
    }

    /// Any namespace counter matching `pred` is above zero
    fn ns_stat_gt_zero(&self, pred: impl Fn(&str) -> bool) -> bool {
        self.namespaces.iter().any(|(_, key, value)| {
            let bare = key.strip_prefix("service.").unwrap_or(key);
            pred(bare) && as_number(value).map_or(false, |n| n > 0.0)
        })
    }

    fn config(&self, key: &str) -> Option<&str> {
        self.configs.get(key).map(String::as_str)
    }

    /// Namespace-scoped config values whose final segment is `setting`
    fn ns_config_values<'a>(&'a self, setting: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.configs.iter().filter_map(move |(key, value)| {
            let in_namespace = key.starts_with("namespace.");
            let matches = key.rsplit('.').next() == Some(setting);
            (in_namespace && matches).then_some(value.as_str())
        })
    }
}

fn gt_zero(value: Option<&str>) -> bool {
    value.and_then(as_number).map_or(false, |n| n > 0.0)
}

fn is_true(value: Option<&str>) -> bool {
    value.map_or(false, |v| v.eq_ignore_ascii_case("true"))
}

type Predicate = fn(&NodeEvidence) -> bool;

/// Capability name and the evidence that activates it
const FEATURE_TABLE: &[(&str, Predicate)] = &[
    ("KVS", |e| {
        e.stat_gt_zero(&["stat_read_reqs", "stat_write_reqs"])
            || e.ns_stat_gt_zero(|k| k == "client_read_success" || k == "client_write_success")
    }),
    ("Batch", |e| {
        e.stat_gt_zero(&["batch_initiate", "batch_index_initiate"])
    }),
    ("UDF", |e| {
        e.stat_gt_zero(&["udf_read_reqs", "udf_write_reqs"])
            || e.ns_stat_gt_zero(|k| k == "client_udf_complete" || k == "client_udf_error")
    }),
    ("Scan", |e| {
        e.stat_gt_zero(&[
            "tscan_initiate",
            "basic_scans_success",
            "aggr_scans_success",
            "udf_bg_scans_success",
        ])
    }),
    ("Query", |e| e.stat_gt_zero(&["query_reqs", "query_success"])),
    ("SIndex", |e| e.stat_gt_zero(&["sindex-used-bytes-memory"])),
    ("XDR", |e| {
        e.stat_gt_zero(&["stat_read_reqs_xdr", "xdr_read_success", "stat_write_reqs_xdr"])
            || e.config_branches.contains("xdr")
            || e.configs.keys().any(|k| k == "xdr" || k.starts_with("xdr."))
    }),
    ("Rack-aware", |e| {
        e.stat_gt_zero(&["self-group-id"]) || e.ns_config_values("rack-id").any(|v| gt_zero(Some(v)))
    }),
    ("Security", |e| is_true(e.config("security.enable-security"))),
    ("TLS", |e| {
        gt_zero(e.config("network.service.tls-port")) || gt_zero(e.config("network.fabric.tls-port"))
    }),
    ("PIndex Query", |e| e.ns_stat_gt_zero(|k| k.starts_with("pi_query_"))),
    ("SIndex Query", |e| e.ns_stat_gt_zero(|k| k.starts_with("si_query_"))),
    ("SC", |e| {
        e.ns_config_values("strong-consistency").any(|v| is_true(Some(v)))
    }),
    ("Index-on-flash", |e| {
        e.ns_config_values("index-type").any(|v| v == "flash")
            || e.ns_stat_gt_zero(|k| k == "index_flash_used_bytes" || k == "index_flash_alloc_bytes")
    }),
];

/// Capabilities supported by the evidence, sorted by name
pub fn discover(evidence: &NodeEvidence) -> BTreeSet<&'static str> {
    FEATURE_TABLE
        .iter()
        .filter(|(_, predicate)| predicate(evidence))
        .map(|(name, _)| *name)
        .collect()
}

pub struct FeaturesExtractor;

impl Extractor for FeaturesExtractor {
    fn name(&self) -> &'static str {
        "features"
    }

    fn extract(
        &self,
        node_id: &str,
        node: &Value,
        store: &FactStore,
        run: &RunContext,
    ) -> Result<(), ExtractorError> {
        let evidence = NodeEvidence::load(store, node_id)?.with_config_branches(node);
        let facts: Vec<FeatureFact> = discover(&evidence)
            .into_iter()
            .map(|feature| FeatureFact {
                node_id: node_id.to_string(),
                feature_name: feature.to_string(),
            })
            .collect();

        tracing::debug!(node_id, features = facts.len(), "Features discovered");
        store.insert_features(run, &facts)?;
        Ok(())
    }
}
