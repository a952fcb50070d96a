//! Cluster-wide classification: version, consistency, storage, platform, topology
//!
//! These keys are global. Every node writes them and the last node processed
//! wins, which is fine because replicas should converge on the same answer.

use super::{engine, namespace_configs, namespace_setting, Extractor};
use crate::error::ExtractorError;
use bundlecheck_core::{ClusterMetadataFact, FactStore, Lookup, RunContext};
use serde_json::Value;
use std::collections::BTreeSet;

pub const UNKNOWN_VERSION: &str = "Unknown";
pub const BARE_METAL: &str = "Bare Metal / On-Prem";

/// Platform fingerprints, strongest signals first. Matching is a best-effort
/// substring heuristic over lowercased configuration text.
const PLATFORM_SIGNATURES: &[(&str, &[&str])] = &[
    ("AWS", &["amazonaws.com", "ec2.internal", "ami-id", "aws-"]),
    ("Azure", &["azure.com", "cloudapp.net", "hv_vmbus", "microsoft"]),
    ("GCP", &["googleapis.com", "gce.internal", "google-managed"]),
    // Site naming and address-range conventions
    ("Azure", &["10.181.", "_va7"]),
    ("AWS", &["10.94.", "us-east-"]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterProfile {
    pub server_version: String,
    pub major_version: String,
    pub consistency_model: String,
    pub storage_flavor: String,
    pub cloud_platform: String,
    pub topology: String,
}

impl ClusterProfile {
    pub fn from_node(node_id: &str, engine: &Value) -> Self {
        let server_version = server_version(engine);
        let major_version = if server_version == UNKNOWN_VERSION {
            UNKNOWN_VERSION.to_string()
        } else {
            server_version
                .split('.')
                .next()
                .unwrap_or(UNKNOWN_VERSION)
                .to_string()
        };

        Self {
            server_version,
            major_version,
            consistency_model: consistency_model(engine).to_string(),
            storage_flavor: storage_flavor(engine),
            cloud_platform: cloud_platform(node_id, engine).to_string(),
            topology: topology(engine).to_string(),
        }
    }

    pub fn into_facts(self) -> Vec<ClusterMetadataFact> {
        [
            ("server_version", self.server_version),
            ("major_version", self.major_version),
            ("consistency_model", self.consistency_model),
            ("storage_flavor", self.storage_flavor),
            ("cloud_platform", self.cloud_platform),
            ("topology", self.topology),
        ]
        .into_iter()
        .map(|(key, value)| ClusterMetadataFact {
            key: key.to_string(),
            value,
        })
        .collect()
    }
}

fn server_version(engine: &Value) -> String {
    Lookup::first_of(
        engine,
        &[
            &["meta_data", "asd_build"],
            &["statistics", "service", "asd_build"],
            &["asd_build"],
            &["build"],
        ],
    )
    .as_str()
    .filter(|s| !s.is_empty())
    .unwrap_or(UNKNOWN_VERSION)
    .to_string()
}

fn is_true(lookup: Lookup<'_>) -> bool {
    match lookup.value() {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn consistency_model(engine: &Value) -> &'static str {
    let sc = namespace_configs(engine)
        .object()
        .map_or(false, |namespaces| {
            namespaces
                .values()
                .any(|ns| is_true(namespace_setting(ns, "strong-consistency")))
        });
    if sc {
        "Strong Consistency (SC)"
    } else {
        "Available/Partition-Tolerant (AP)"
    }
}

fn classify_engine(descriptor: Option<&Value>) -> &'static str {
    match descriptor {
        Some(Value::String(s)) => {
            let lower = s.to_lowercase();
            if lower.contains("device") {
                "DEVICE"
            } else if lower.contains("file") {
                "FILE"
            } else {
                "MEMORY"
            }
        }
        Some(Value::Object(map)) => {
            if map.contains_key("devices") || map.contains_key("device") {
                "DEVICE"
            } else if map.contains_key("files") || map.contains_key("file") {
                "FILE"
            } else {
                "MEMORY"
            }
        }
        _ => "MEMORY",
    }
}

fn storage_flavor(engine: &Value) -> String {
    let flavors: BTreeSet<&str> = namespace_configs(engine)
        .object()
        .map(|namespaces| {
            namespaces
                .values()
                .map(|ns| classify_engine(namespace_setting(ns, "storage-engine").value()))
                .collect()
        })
        .unwrap_or_default();

    if flavors.is_empty() {
        "MEMORY".to_string()
    } else {
        flavors.into_iter().collect::<Vec<_>>().join("/")
    }
}

fn cloud_platform(node_id: &str, engine: &Value) -> &'static str {
    let mut context = String::new();
    for branch in ["config", "statistics"] {
        if let Some(v) = engine.get(branch) {
            context.push_str(&v.to_string());
        }
    }
    if !engine.get("config").map_or(false, Value::is_object) {
        // Legacy bundles keep configuration at the root
        context.push_str(&engine.to_string());
    }
    context.push_str(node_id);
    let context = context.to_lowercase();

    PLATFORM_SIGNATURES
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| context.contains(n)))
        .map_or(BARE_METAL, |(platform, _)| *platform)
}

fn topology(engine: &Value) -> &'static str {
    let non_empty = |path: &[&str]| {
        Lookup::at(engine, path)
            .object()
            .map_or(false, |m| !m.is_empty())
    };
    if non_empty(&["statistics", "xdr"]) || non_empty(&["config", "xdr"]) {
        "XDR Enabled"
    } else {
        "Standalone"
    }
}

pub struct MetadataExtractor;

impl Extractor for MetadataExtractor {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn extract(
        &self,
        node_id: &str,
        node: &Value,
        store: &FactStore,
        _run: &RunContext,
    ) -> Result<(), ExtractorError> {
        let Some(engine) = engine(node).value() else {
            return Ok(());
        };
        let profile = ClusterProfile::from_node(node_id, engine);
        tracing::debug!(
            node_id,
            platform = %profile.cloud_platform,
            consistency = %profile.consistency_model,
            storage = %profile.storage_flavor,
            "Cluster profile"
        );
        store.put_cluster_metadata(&profile.into_facts())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_modern_profile() {
        let engine = json!({
            "meta_data": {"asd_build": "7.2.0.1"},
            "statistics": {"service": {}, "xdr": {"dc1": {"lag": 0}}},
            "config": {
                "network": {"service": {"access-address": "ip-10-0-0-1.ec2.internal"}},
                "namespace": {
                    "a": {"service": {"strong-consistency": "true", "storage-engine": "device"}},
                    "b": {"service": {"storage-engine": {"file": "/opt/b.dat"}}}
                }
            }
        });
        let p = ClusterProfile::from_node("BB9", &engine);
        assert_eq!(p.server_version, "7.2.0.1");
        assert_eq!(p.major_version, "7");
        assert_eq!(p.consistency_model, "Strong Consistency (SC)");
        assert_eq!(p.storage_flavor, "DEVICE/FILE");
        assert_eq!(p.cloud_platform, "AWS");
        assert_eq!(p.topology, "XDR Enabled");
    }

    #[test]
    fn test_legacy_profile_defaults() {
        let engine = json!({
            "build": "5.7.0.8",
            "namespaces": {"test": {"objects": 5}}
        });
        let p = ClusterProfile::from_node("node1", &engine);
        assert_eq!(p.server_version, "5.7.0.8");
        assert_eq!(p.consistency_model, "Available/Partition-Tolerant (AP)");
        assert_eq!(p.storage_flavor, "MEMORY");
        assert_eq!(p.cloud_platform, BARE_METAL);
        assert_eq!(p.topology, "Standalone");
    }

    #[test]
    fn test_platform_tiers() {
        let azure = json!({"config": {"network": {"service": {"address": "10.181.4.2"}}}});
        assert_eq!(ClusterProfile::from_node("n", &azure).cloud_platform, "Azure");

        let unknown = json!({});
        let p = ClusterProfile::from_node("n", &unknown);
        assert_eq!(p.server_version, UNKNOWN_VERSION);
        assert_eq!(p.major_version, UNKNOWN_VERSION);
    }

    #[test]
    fn test_last_node_wins() {
        let store = FactStore::open_in_memory().unwrap();
        let run = RunContext::new("t.tgz");
        let aws = json!({"as_stat": {"config": {"x": "amazonaws.com"}}});
        let metal = json!({"as_stat": {"config": {"x": "rack-12"}}});

        MetadataExtractor.extract("n1", &aws, &store, &run).unwrap();
        MetadataExtractor.extract("n2", &metal, &store, &run).unwrap();

        assert_eq!(
            store.cluster_metadata("cloud_platform").unwrap().as_deref(),
            Some(BARE_METAL)
        );
    }
}
