//! 1.c Version Consistency

use crate::error::RuleError;
use crate::rule::{no_evidence, preflight, Requirement, Rule};
use bundlecheck_core::{FactStore, FactTable, RuleVerdict};
use std::collections::{BTreeMap, BTreeSet};

/// Build fields in order of preference
pub const BUILD_METRICS: &[&str] = &["meta_data.asd_build", "service.asd_build", "service.build"];

const NODE_METRICS: &[Requirement] = &[(
    FactTable::NodeMetrics,
    &["node_id", "metric_key", "value"],
)];

pub struct VersionConsistency;

impl Rule for VersionConsistency {
    fn id(&self) -> &'static str {
        "1.c"
    }

    fn name(&self) -> &'static str {
        "Version Consistency"
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, NODE_METRICS)? {
            return Ok(missing);
        }

        // node -> (preference rank, build)
        let mut builds: BTreeMap<String, (usize, String)> = BTreeMap::new();
        for fact in store.node_metrics(BUILD_METRICS)? {
            let value = fact.value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            let rank = BUILD_METRICS
                .iter()
                .position(|k| *k == fact.metric_key)
                .unwrap_or(BUILD_METRICS.len());
            let preferred = builds
                .get(&fact.node_id)
                .map_or(true, |(existing, _)| rank < *existing);
            if preferred {
                builds.insert(fact.node_id, (rank, value));
            }
        }
        if builds.is_empty() {
            return Ok(no_evidence(self, "server build identifiers"));
        }

        let mut by_version: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (node, (_, build)) in &builds {
            by_version.entry(build.as_str()).or_default().insert(node.as_str());
        }

        if by_version.len() == 1 {
            let version = by_version.keys().next().copied().unwrap_or_default();
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                format!("All {} node(s) run build {}.", builds.len(), version),
            ));
        }

        let detail: Vec<String> = by_version
            .iter()
            .map(|(version, nodes)| {
                format!("{} on {}", version, nodes.iter().copied().collect::<Vec<_>>().join(", "))
            })
            .collect();
        Ok(RuleVerdict::critical(
            self.id(),
            self.name(),
            format!(
                "Mixed server builds detected ({} versions): {}",
                by_version.len(),
                detail.join(" | ")
            ),
            "Running mixed builds is only supported for the duration of a rolling upgrade. \
             Finish the upgrade so every node runs the same build.",
        ))
    }
}
