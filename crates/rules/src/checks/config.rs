//! Configuration consistency: across nodes (3.a) and against the bundled
//! static configuration file (3.b)

use super::NODE_CONFIGS;
use crate::error::RuleError;
use crate::rule::{no_evidence, preflight, Requirement, Rule};
use bundlecheck_core::{as_number, FactStore, FactTable, RuleVerdict};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// 3.a Config Symmetry
// ============================================================================

/// Settings that are unique per node by nature
pub const NODE_UNIQUE_KEYS: &[&str] = &[
    "service.node-id",
    "service.cluster-name",
    "network.service.address",
    "network.service.access-address",
    "network.service.alternate-access-address",
    "network.service.port",
    "network.heartbeat.address",
    "network.heartbeat.mesh-seed-address-port",
    "network.fabric.address",
];

/// Dynamic counters that some collectors leave inside the config tree
const STATISTIC_SUFFIXES: &[&str] = &[
    ".objects",
    ".data_used_bytes",
    ".memory_data_bytes",
    ".stop-writes-count",
    ".evict-count",
];

pub struct ConfigSymmetry;

impl ConfigSymmetry {
    pub fn is_ignored(key: &str) -> bool {
        NODE_UNIQUE_KEYS.contains(&key) || STATISTIC_SUFFIXES.iter().any(|s| key.ends_with(s))
    }
}

impl Rule for ConfigSymmetry {
    fn id(&self) -> &'static str {
        "3.a"
    }

    fn name(&self) -> &'static str {
        "Config Symmetry"
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, NODE_CONFIGS)? {
            return Ok(missing);
        }
        let facts = store.node_configs()?;
        if facts.is_empty() {
            return Ok(no_evidence(self, "node configuration"));
        }

        let mut distinct: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for fact in facts {
            if !Self::is_ignored(&fact.config_name) {
                distinct.entry(fact.config_name).or_default().insert(fact.value);
            }
        }
        let drifted: Vec<&str> = distinct
            .iter()
            .filter(|(_, values)| values.len() > 1)
            .map(|(key, _)| key.as_str())
            .collect();

        if drifted.is_empty() {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                "All nodes share identical configuration.",
            ));
        }
        Ok(RuleVerdict::warning(
            self.id(),
            self.name(),
            format!(
                "Detected {} configuration drifts across nodes: {}",
                drifted.len(),
                drifted.join(", ")
            ),
            "Align the listed settings on every node. Asymmetric configuration leads to \
             uneven load and unpredictable behavior during migrations.",
        ))
    }
}

// ============================================================================
// 3.b Config Drift
// ============================================================================

const LIVE_AND_STATIC: &[Requirement] = &[
    (FactTable::NodeConfigs, &["node_id", "config_name", "value"]),
    (FactTable::StaticConfigs, &["node_id", "config_name", "value"]),
];

pub struct ConfigDrift;

/// Live namespace settings carry a `service` context segment that the static
/// file does not: `namespace.test.service.x` and `namespace.test.x` are the
/// same setting.
pub fn canonical_key(key: &str) -> String {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.len() > 3 && parts[0] == "namespace" && parts[2] == "service" {
        let mut kept = parts[..2].to_vec();
        kept.extend_from_slice(&parts[3..]);
        kept.join(".")
    } else {
        key.to_string()
    }
}

fn same_value(live: &str, file: &str) -> bool {
    let (live, file) = (live.trim(), file.trim());
    if live.eq_ignore_ascii_case(file) {
        return true;
    }
    match (as_number(live), as_number(file)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

impl Rule for ConfigDrift {
    fn id(&self) -> &'static str {
        "3.b"
    }

    fn name(&self) -> &'static str {
        "Config Drift"
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, LIVE_AND_STATIC)? {
            return Ok(missing);
        }

        let on_disk: BTreeMap<(String, String), String> = store
            .static_configs()?
            .into_iter()
            .filter(|f| !ConfigSymmetry::is_ignored(&f.config_name))
            .map(|f| ((f.node_id, canonical_key(&f.config_name)), f.value))
            .collect();
        if on_disk.is_empty() {
            return Ok(no_evidence(self, "static configuration file"));
        }

        let mut compared = 0usize;
        let mut mismatches = Vec::new();
        for live in store.node_configs()? {
            if ConfigSymmetry::is_ignored(&live.config_name) {
                continue;
            }
            let key = (live.node_id, canonical_key(&live.config_name));
            let Some(file_value) = on_disk.get(&key) else {
                continue;
            };
            compared += 1;
            if !same_value(&live.value, file_value) {
                mismatches.push(format!(
                    "{} on {} (running: {}, file: {})",
                    key.1, key.0, live.value, file_value
                ));
            }
        }

        if mismatches.is_empty() {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                format!(
                    "Running configuration matches the static file ({} settings compared).",
                    compared
                ),
            ));
        }
        Ok(RuleVerdict::warning(
            self.id(),
            self.name(),
            format!(
                "Running configuration differs from the static file: {}",
                mismatches.join(" | ")
            ),
            "Dynamic changes were applied without updating the configuration file. \
             Persist them in the file or they will be lost on the next restart.",
        ))
    }
}
