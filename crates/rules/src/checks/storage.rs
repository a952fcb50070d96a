//! Storage configuration checks: sprig sizing (2.b), defrag vs eviction
//! deadlock (2.c) and secondary index placement (4.d)

use super::{namespace_settings, NamespaceSetting, NODE_CONFIGS};
use super::capacity::namespace_samples;
use crate::error::RuleError;
use crate::rule::{fmt_num, no_evidence, preflight, Requirement, Rule};
use bundlecheck_core::{as_number, FactStore, FactTable, RuleThresholds, RuleVerdict};
use std::collections::{BTreeMap, BTreeSet};

/// Partitions per namespace
const PARTITIONS: f64 = 4096.0;
/// Server default for `partition-tree-sprigs`
const DEFAULT_SPRIGS: f64 = 256.0;

type NamespaceKey = (String, String);

// ============================================================================
// 2.b Sprig Limit Warning
// ============================================================================

pub struct SprigLimit {
    records_limit: f64,
}

impl SprigLimit {
    pub fn new(thresholds: &RuleThresholds) -> Self {
        Self {
            records_limit: thresholds.sprig_records_limit,
        }
    }
}

impl Rule for SprigLimit {
    fn id(&self) -> &'static str {
        "2.b"
    }

    fn name(&self) -> &'static str {
        "Sprig Limit Warning"
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, NODE_CONFIGS)? {
            return Ok(missing);
        }
        let settings = namespace_settings(store)?;

        let flash: BTreeSet<NamespaceKey> = settings
            .iter()
            .filter(|s| s.setting == "index-type" && s.value.eq_ignore_ascii_case("flash"))
            .map(NamespaceSetting::key)
            .collect();
        if flash.is_empty() {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                "Not Applicable: No namespaces are currently configured for Index-on-Flash.",
            ));
        }

        const OBJECTS: &[Requirement] = &[(
            FactTable::NamespaceMetrics,
            &["node_id", "namespace", "metric_key", "value"],
        )];
        if let Some(missing) = preflight(self, store, OBJECTS)? {
            return Ok(missing);
        }

        let sprigs: BTreeMap<NamespaceKey, f64> = settings
            .iter()
            .filter(|s| s.setting == "partition-tree-sprigs")
            .filter_map(|s| as_number(&s.value).map(|n| (s.key(), n)))
            .filter(|(_, n)| *n > 0.0)
            .collect();

        let mut findings = Vec::new();
        for sample in namespace_samples(store, &["service.objects"])? {
            let key = (sample.node_id.clone(), sample.namespace.clone());
            if !flash.contains(&key) {
                continue;
            }
            let per_sprig = sample.value / (PARTITIONS * sprigs.get(&key).copied().unwrap_or(DEFAULT_SPRIGS));
            if per_sprig > self.records_limit {
                findings.push(format!(
                    "{} on {} ({} records per sprig)",
                    sample.namespace,
                    sample.node_id,
                    fmt_num(per_sprig)
                ));
            }
        }

        if findings.is_empty() {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                "Index-on-Flash configurations are within safe sprig limits.",
            ));
        }
        Ok(RuleVerdict::warning(
            self.id(),
            self.name(),
            format!(
                "Sprigs are over-filled (limit {} records): {}",
                fmt_num(self.records_limit),
                findings.join(" | ")
            ),
            "Each index-on-flash sprig should fit in a single 4 KiB block. Raise \
             'partition-tree-sprigs' for the affected namespaces (requires a cold restart).",
        ))
    }
}

// ============================================================================
// 2.c Storage Deadlock Risk
// ============================================================================

const DEFRAG_SETTINGS: &[&str] = &["defrag-lwm-pct", "defrag-lwm-free-pct"];
const EVICTION_SETTINGS: &[&str] = &["high-water-disk-pct", "evict-used-pct"];

pub struct StorageDeadlock {
    defrag_floor_pct: f64,
}

impl StorageDeadlock {
    pub fn new(thresholds: &RuleThresholds) -> Self {
        Self {
            defrag_floor_pct: thresholds.defrag_lwm_floor_pct,
        }
    }

    /// Defrag cannot keep ahead of eviction
    pub fn at_risk(&self, defrag_pct: f64, eviction_pct: Option<f64>) -> bool {
        defrag_pct < self.defrag_floor_pct || eviction_pct.map_or(false, |hwm| defrag_pct <= hwm)
    }
}

impl Rule for StorageDeadlock {
    fn id(&self) -> &'static str {
        "2.c"
    }

    fn name(&self) -> &'static str {
        "Storage Deadlock Risk"
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, NODE_CONFIGS)? {
            return Ok(missing);
        }

        let mut defrag: BTreeMap<NamespaceKey, f64> = BTreeMap::new();
        // Lowest eviction mark per namespace; eviction starts at whichever is hit first
        let mut eviction: BTreeMap<NamespaceKey, f64> = BTreeMap::new();
        for s in namespace_settings(store)? {
            let Some(n) = as_number(&s.value) else {
                continue;
            };
            if DEFRAG_SETTINGS.contains(&s.setting.as_str()) {
                defrag.insert(s.key(), n);
            } else if EVICTION_SETTINGS.contains(&s.setting.as_str()) {
                eviction
                    .entry(s.key())
                    .and_modify(|mark| *mark = mark.min(n))
                    .or_insert(n);
            }
        }
        if defrag.is_empty() {
            return Ok(no_evidence(self, "namespace defragmentation settings"));
        }

        let findings: Vec<String> = defrag
            .iter()
            .filter(|(key, d)| self.at_risk(**d, eviction.get(*key).copied()))
            .map(|((node, ns), d)| match eviction.get(&(node.clone(), ns.clone())) {
                Some(hwm) => format!("{} on {} (HWM:{}% >= Defrag:{}%)", ns, node, fmt_num(*hwm), fmt_num(*d)),
                None => format!("{} on {} (Defrag:{}% below {}%)", ns, node, fmt_num(*d), fmt_num(self.defrag_floor_pct)),
            })
            .collect();

        if findings.is_empty() {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                "Defragmentation thresholds are correctly set above eviction marks.",
            ));
        }
        Ok(RuleVerdict::critical(
            self.id(),
            self.name(),
            format!(
                "Potential Deadlock: Eviction threshold is higher than or equal to Defrag LWM: {}",
                findings.join(" | ")
            ),
            "Increase 'defrag-lwm-pct' or decrease the eviction high-water mark. Defrag must \
             be more aggressive than eviction so that free blocks are always available.",
        ))
    }
}

// ============================================================================
// 4.d SIndex on Flash
// ============================================================================

pub struct SIndexOnFlash;

impl Rule for SIndexOnFlash {
    fn id(&self) -> &'static str {
        "4.d"
    }

    fn name(&self) -> &'static str {
        "SIndex on Flash"
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, NODE_CONFIGS)? {
            return Ok(missing);
        }
        let in_memory: BTreeSet<String> = namespace_settings(store)?
            .into_iter()
            .filter(|s| s.setting == "sindex-type" && !s.value.eq_ignore_ascii_case("flash"))
            .map(|s| format!("{} on {}", s.namespace, s.node_id))
            .collect();

        if in_memory.is_empty() {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                "Secondary indexes are optimized on Flash or not present.",
            ));
        }
        Ok(RuleVerdict::warning(
            self.id(),
            self.name(),
            format!(
                "Secondary indexes detected in RAM: {}",
                in_memory.into_iter().collect::<Vec<_>>().join(", ")
            ),
            "On server 7.2 and later, consider moving secondary indexes to Flash to reduce RAM consumption.",
        ))
    }
}
