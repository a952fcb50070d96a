//! Ingestion pipeline: bundle -> run context -> per-node extraction
//!
//! Archive resolution is the only failure that aborts a run. Everything
//! after it degrades coverage and is reported in the [`IngestSummary`].

use crate::archive::ArchiveResolver;
use crate::error::IngestError;
use crate::extractors::ExtractorRegistry;
use crate::static_config;
use bundlecheck_core::{ArchiveConfig, ConfigFact, FactSource, FactStore, RunContext, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

/// One extractor that failed on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractorFailure {
    pub node_id: String,
    pub extractor: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub run_id: String,
    /// Archive entry the telemetry came from, when ingested from an archive
    pub telemetry_entry: Option<String>,
    pub nodes: usize,
    pub extractor_runs: usize,
    pub failures: Vec<ExtractorFailure>,
    pub static_config_rows: usize,
}

impl IngestSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Pipeline {
    resolver: ArchiveResolver,
    registry: ExtractorRegistry,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(ArchiveConfig::default())
    }
}

impl Pipeline {
    pub fn new(archive: ArchiveConfig) -> Self {
        Self::with_registry(ArchiveResolver::new(archive), ExtractorRegistry::standard())
    }

    pub fn with_registry(resolver: ArchiveResolver, registry: ExtractorRegistry) -> Self {
        Self { resolver, registry }
    }

    /// Resolve the bundle at `path` and ingest it into `store` under a fresh run
    pub fn ingest_archive(&self, path: &Path, store: &FactStore) -> Result<IngestSummary, IngestError> {
        let bundle = self.resolver.resolve_bundle(path).map_err(|e| {
            tracing::error!(path = %path.display(), "Archive resolution failed: {}", e);
            e
        })?;

        let static_pairs = bundle.static_config.as_ref().and_then(|cfg| {
            match static_config::parse(&cfg.text) {
                Ok(pairs) => {
                    tracing::info!(entry = %cfg.entry_name, keys = pairs.len(), "Parsed static config");
                    Some(pairs)
                }
                Err(e) => {
                    tracing::warn!(entry = %cfg.entry_name, "Ignoring unparseable static config: {}", e);
                    None
                }
            }
        });

        let run = RunContext::new(path);
        let mut summary = self.ingest_document(&bundle.telemetry, store, &run, static_pairs.as_deref())?;
        summary.telemetry_entry = Some(bundle.entry_name);
        Ok(summary)
    }

    /// Ingest an already-parsed telemetry document
    ///
    /// The document is `{ timestamp: { cluster: { node_id: telemetry } } }`.
    pub fn ingest_document(
        &self,
        document: &Value,
        store: &FactStore,
        run: &RunContext,
        static_config: Option<&[(String, String)]>,
    ) -> Result<IngestSummary, IngestError> {
        let snapshots = document
            .as_object()
            .ok_or(IngestError::Document { level: "timestamp" })?;

        store.in_transaction(|store| {
            store.begin_run(run)?;

            let mut summary = IngestSummary {
                run_id: run.run_id().to_string(),
                ..Default::default()
            };
            let mut seen = BTreeSet::new();

            for (timestamp, clusters) in snapshots {
                let Some(clusters) = clusters.as_object() else {
                    tracing::warn!(timestamp, "Skipping non-object snapshot");
                    continue;
                };
                for (cluster, nodes) in clusters {
                    let Some(nodes) = nodes.as_object() else {
                        tracing::warn!(timestamp, cluster, "Skipping non-object cluster");
                        continue;
                    };
                    for (node_id, telemetry) in nodes {
                        if !telemetry.is_object() {
                            tracing::warn!(cluster, node_id, "Skipping non-object node telemetry");
                            continue;
                        }
                        let outcome = self.registry.run_node(node_id, telemetry, store, run);
                        summary.extractor_runs += outcome.succeeded + outcome.failed.len();
                        summary
                            .failures
                            .extend(outcome.failed.into_iter().map(|extractor| ExtractorFailure {
                                node_id: node_id.clone(),
                                extractor,
                            }));
                        seen.insert(node_id.clone());
                    }
                }
            }
            summary.nodes = seen.len();

            if let Some(pairs) = static_config {
                summary.static_config_rows = write_static_config(store, run, &seen, pairs)?;
            }

            tracing::info!(
                run_id = %summary.run_id,
                nodes = summary.nodes,
                failures = summary.failures.len(),
                static_config_rows = summary.static_config_rows,
                "Ingestion complete"
            );
            Ok(summary)
        })
    }
}

/// The static file describes every node, so it is recorded once per node
fn write_static_config(
    store: &FactStore,
    run: &RunContext,
    nodes: &BTreeSet<String>,
    pairs: &[(String, String)],
) -> Result<usize, StoreError> {
    let facts: Vec<ConfigFact> = nodes
        .iter()
        .flat_map(|node_id| {
            pairs.iter().map(move |(config_name, value)| ConfigFact {
                node_id: node_id.clone(),
                config_name: config_name.clone(),
                value: value.clone(),
                source: FactSource::File,
            })
        })
        .collect();
    store.insert_static_configs(run, &facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlecheck_core::FactTable;
    use serde_json::json;

    #[test]
    fn test_walks_every_node() {
        let store = FactStore::open_in_memory().unwrap();
        let run = RunContext::new("doc.json");
        let doc = json!({
            "2026-01-20 23:00:14": {
                "prod": {
                    "10.0.0.1:3000": {"as_stat": {"statistics": {"service": {"uptime": 1}}}},
                    "10.0.0.2:3000": {"as_stat": {"statistics": {"service": {"uptime": 2}}}},
                    "broken": "n/a"
                }
            }
        });

        let summary = Pipeline::default()
            .ingest_document(&doc, &store, &run, None)
            .unwrap();

        assert_eq!(summary.nodes, 2);
        assert!(summary.is_complete());
        assert_eq!(store.node_metrics(&["service.uptime"]).unwrap().len(), 2);
        assert_eq!(store.row_count(FactTable::RunContext).unwrap(), 1);
    }

    #[test]
    fn test_static_config_written_per_node() {
        let store = FactStore::open_in_memory().unwrap();
        let run = RunContext::new("doc.json");
        let doc = json!({"ts": {"c": {"a": {"as_stat": {}}, "b": {"as_stat": {}}}}});
        let pairs = vec![("service.proto-fd-max".to_string(), "15000".to_string())];

        let summary = Pipeline::default()
            .ingest_document(&doc, &store, &run, Some(pairs.as_slice()))
            .unwrap();

        assert_eq!(summary.static_config_rows, 2);
        let rows = store.static_configs().unwrap();
        assert!(rows.iter().all(|r| r.source == FactSource::File));
    }

    #[test]
    fn test_non_object_document_is_rejected() {
        let store = FactStore::open_in_memory().unwrap();
        let run = RunContext::new("doc.json");
        let err = Pipeline::default()
            .ingest_document(&json!([1, 2]), &store, &run, None)
            .unwrap_err();
        assert!(matches!(err, IngestError::Document { level: "timestamp" }));
    }
}
