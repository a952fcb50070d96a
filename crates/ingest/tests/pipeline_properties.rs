//! End-to-end ingestion properties over real bundle files

mod common;

use bundlecheck_core::{ArchiveConfig, FactStore, FactTable, RunContext};
use bundlecheck_ingest::extractors::{Extractor, ExtractorRegistry, NodeStatsExtractor};
use bundlecheck_ingest::{ArchiveResolver, ExtractorError, IngestError, Pipeline};
use common::*;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

#[test]
fn test_ingest_standard_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = standard_bundle(dir.path());
    let store = FactStore::create(&dir.path().join("facts.db")).unwrap();

    let summary = Pipeline::default().ingest_archive(&bundle, &store).unwrap();

    assert_eq!(summary.nodes, 2);
    assert!(summary.is_complete(), "failures: {:?}", summary.failures);
    assert_eq!(
        summary.telemetry_entry.as_deref(),
        Some("collect/20260120_230014_ascinfo.json")
    );
    assert_eq!(store.row_count(FactTable::SystemInfo).unwrap(), 4);
    assert_eq!(store.row_count(FactTable::SecurityConnections).unwrap(), 2);
    assert_eq!(
        store.cluster_metadata("server_version").unwrap().as_deref(),
        Some("7.2.0.1")
    );
    let features: BTreeSet<String> = store
        .features()
        .unwrap()
        .into_iter()
        .map(|f| f.feature_name)
        .collect();
    assert!(features.contains("KVS"));
    assert!(!store.has_table("static_configs").unwrap());
}

#[test]
fn test_config_and_statistics_keys_are_disjoint() {
    let store = FactStore::open_in_memory().unwrap();
    let run = RunContext::new("doc.json");
    Pipeline::default()
        .ingest_document(&telemetry(), &store, &run, None)
        .unwrap();

    let config_keys: BTreeSet<String> = store
        .node_configs()
        .unwrap()
        .into_iter()
        .map(|c| c.config_name)
        .collect();
    let metric_rows = store.table_rows(FactTable::NodeMetrics).unwrap();
    let ns_rows = store.table_rows(FactTable::NamespaceMetrics).unwrap();
    let metric_keys: BTreeSet<String> = metric_rows
        .iter()
        .chain(ns_rows.iter())
        .filter_map(|row| row.get("metric_key").cloned())
        .collect();

    assert!(!config_keys.is_empty());
    assert!(!metric_keys.is_empty());
    assert!(
        config_keys.is_disjoint(&metric_keys),
        "overlap: {:?}",
        config_keys.intersection(&metric_keys).collect::<Vec<_>>()
    );
    assert!(!config_keys.iter().any(|k| k.starts_with("meta_data.")));
}

fn rows_without_run_id(store: &FactStore) -> BTreeMap<&'static str, Vec<BTreeMap<String, String>>> {
    FactTable::ALL
        .iter()
        .filter(|t| **t != FactTable::RunContext)
        .map(|table| {
            let mut rows = store.table_rows(*table).unwrap();
            for row in &mut rows {
                row.remove("run_id");
            }
            rows.sort();
            (table.name(), rows)
        })
        .collect()
}

#[test]
fn test_run_isolation() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = standard_bundle(dir.path());
    let db = dir.path().join("facts.db");
    let pipeline = Pipeline::default();

    let first = {
        let store = FactStore::create(&db).unwrap();
        let summary = pipeline.ingest_archive(&bundle, &store).unwrap();
        (summary.run_id, rows_without_run_id(&store))
    };
    let second = {
        let store = FactStore::create(&db).unwrap();
        let summary = pipeline.ingest_archive(&bundle, &store).unwrap();
        (summary.run_id, rows_without_run_id(&store))
    };

    assert_ne!(first.0, second.0);
    assert_eq!(first.1, second.1);
    assert!(!first.1["node_metrics"].is_empty());
}

struct Exploding;

impl Extractor for Exploding {
    fn name(&self) -> &'static str {
        "exploding"
    }

    fn extract(
        &self,
        node_id: &str,
        _node: &Value,
        _store: &bundlecheck_core::FactStore,
        _run: &RunContext,
    ) -> Result<(), ExtractorError> {
        if node_id.ends_with(".1:3000") {
            return Err(ExtractorError::Shape {
                path: node_id.to_string(),
                detail: "boom".to_string(),
            });
        }
        Ok(())
    }
}

#[test]
fn test_extractor_failure_does_not_abort_run() {
    let mut registry = ExtractorRegistry::empty();
    registry.register(Box::new(Exploding));
    registry.register(Box::new(NodeStatsExtractor));
    let pipeline = Pipeline::with_registry(ArchiveResolver::new(ArchiveConfig::default()), registry);

    let store = FactStore::open_in_memory().unwrap();
    let run = RunContext::new("doc.json");
    let summary = pipeline
        .ingest_document(&telemetry(), &store, &run, None)
        .unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].extractor, "exploding");
    assert_eq!(summary.failures[0].node_id, "10.0.0.1:3000");
    // Both nodes still produced statistics
    let uptime = store.node_metrics(&["service.uptime"]).unwrap();
    assert_eq!(uptime.len(), 2);
}

#[test]
fn test_static_config_from_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let payload = serde_json::to_vec(&telemetry()).unwrap();
    let conf = b"service {\n    proto-fd-max 20000\n}\n".to_vec();
    let bytes = tgz_bytes(&[("ascinfo.json", payload), ("etc/aerospike.conf", conf)]);
    let bundle = write_bundle(dir.path(), "bundle.tgz", &bytes);
    let store = FactStore::create(&dir.path().join("facts.db")).unwrap();

    let summary = Pipeline::default().ingest_archive(&bundle, &store).unwrap();

    assert_eq!(summary.static_config_rows, 2);
    let rows = store.static_configs().unwrap();
    assert!(rows
        .iter()
        .all(|r| r.config_name == "service.proto-fd-max" && r.value == "20000"));
}

#[test]
fn test_missing_archive_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let store = FactStore::open_in_memory().unwrap();
    let err = Pipeline::default()
        .ingest_archive(&dir.path().join("absent.tgz"), &store)
        .unwrap_err();
    assert!(matches!(err, IngestError::Archive(_)));
    assert!(!store.has_table("run_context").unwrap());
}

#[test]
fn test_legacy_document_shape() {
    let doc = json!({"ts": {"old": {"n1": {"as_stat": {
        "build": "5.7.0.8",
        "client_proxy_error": 3,
        "namespaces": {"test": {"data_used_pct": 12}},
        "network": {"service": {"port": 3000}}
    }}}}});
    let store = FactStore::open_in_memory().unwrap();
    let run = RunContext::new("legacy.json");
    Pipeline::default()
        .ingest_document(&doc, &store, &run, None)
        .unwrap();

    assert_eq!(store.node_metrics(&["service.client_proxy_error"]).unwrap().len(), 1);
    assert_eq!(store.namespace_metrics(&["service.data_used_pct"]).unwrap().len(), 1);
    let configs = store.node_configs().unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].config_name, "network.service.port");
}

#[test]
fn test_features_come_from_the_current_run_only() {
    let store = FactStore::open_in_memory().unwrap();
    let pipeline = Pipeline::default();
    pipeline
        .ingest_document(&telemetry(), &store, &RunContext::new("busy.tgz"), None)
        .unwrap();
    assert!(store.features().unwrap().iter().any(|f| f.feature_name == "KVS"));

    let idle = json!({"2026-01-21 09:00:00": {"prod": {
        "10.0.0.1:3000": {"as_stat": {"statistics": {"service": {"uptime": 5}}}}
    }}});
    pipeline
        .ingest_document(&idle, &store, &RunContext::new("idle.tgz"), None)
        .unwrap();

    assert!(store.features().unwrap().is_empty());
    assert_eq!(store.node_metrics_for("10.0.0.2:3000").unwrap(), Vec::new());
}
