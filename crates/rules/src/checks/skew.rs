//! Skew detection: service errors per node (1.a) and set objects per node (4.f)

use crate::error::RuleError;
use crate::rule::{fmt_num, mean, no_evidence, preflight, std_dev, Requirement, Rule};
use bundlecheck_core::{as_number, FactStore, FactTable, RuleThresholds, RuleVerdict};
use std::collections::BTreeMap;

// ============================================================================
// 1.a Service Error Skew
// ============================================================================

pub const ERROR_METRICS: &[&str] = &["service.client_proxy_error", "service.batch_index_error"];

const NODE_METRICS: &[Requirement] = &[(
    FactTable::NodeMetrics,
    &["node_id", "metric_key", "value"],
)];

pub struct ServiceErrorSkew {
    factor: f64,
    floor: f64,
}

impl ServiceErrorSkew {
    pub fn new(thresholds: &RuleThresholds) -> Self {
        Self {
            factor: thresholds.error_skew_factor,
            floor: thresholds.error_skew_floor,
        }
    }

    /// Indices of values above `factor` x mean and above `floor`
    pub fn outliers(&self, values: &[f64]) -> Vec<usize> {
        let Some(avg) = mean(values) else {
            return Vec::new();
        };
        values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > self.factor * avg && **v > self.floor)
            .map(|(i, _)| i)
            .collect()
    }
}

impl Rule for ServiceErrorSkew {
    fn id(&self) -> &'static str {
        "1.a"
    }

    fn name(&self) -> &'static str {
        "Service Error Skew"
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, NODE_METRICS)? {
            return Ok(missing);
        }

        let mut by_metric: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
        for fact in store.node_metrics(ERROR_METRICS)? {
            if let Some(v) = as_number(&fact.value) {
                by_metric.entry(fact.metric_key).or_default().push((fact.node_id, v));
            }
        }
        if by_metric.is_empty() {
            return Ok(no_evidence(self, "service error counters"));
        }

        let mut findings = Vec::new();
        for (metric, samples) in &by_metric {
            let values: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
            let avg = mean(&values).unwrap_or_default();
            for i in self.outliers(&values) {
                let (node, value) = &samples[i];
                findings.push(format!(
                    "{} on {} (Value: {} vs Avg: {:.1})",
                    metric.trim_start_matches("service."),
                    node,
                    fmt_num(*value),
                    avg
                ));
            }
        }

        if findings.is_empty() {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                "Service errors are evenly distributed across nodes.",
            ));
        }
        Ok(RuleVerdict::warning(
            self.id(),
            self.name(),
            format!("Error skew detected: {}", findings.join(" | ")),
            "A single node concentrating proxy or batch errors usually points at a partition \
             imbalance, a failing network path or a client pinned to one node. Compare the \
             node's logs and migrations against its peers.",
        ))
    }
}

// ============================================================================
// 4.f Set Object Skew
// ============================================================================

pub struct SetObjectSkew {
    max_cv: f64,
    min_mean: f64,
}

impl SetObjectSkew {
    pub fn new(thresholds: &RuleThresholds) -> Self {
        Self {
            max_cv: thresholds.set_skew_cv,
            min_mean: thresholds.set_skew_min_mean,
        }
    }
}

const SET_METRICS: &[Requirement] = &[(
    FactTable::SetMetrics,
    &["node_id", "namespace", "set_name", "key", "value"],
)];

impl Rule for SetObjectSkew {
    fn id(&self) -> &'static str {
        "4.f"
    }

    fn name(&self) -> &'static str {
        "Set Object Skew"
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, SET_METRICS)? {
            return Ok(missing);
        }

        let mut by_set: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
        for fact in store.set_metrics("objects")? {
            if let Some(v) = as_number(&fact.value) {
                by_set.entry((fact.namespace, fact.set_name)).or_default().push(v);
            }
        }
        if by_set.is_empty() {
            return Ok(no_evidence(self, "set object counts"));
        }

        let mut findings = Vec::new();
        for ((namespace, set), counts) in &by_set {
            if counts.len() < 2 {
                continue;
            }
            let (Some(avg), Some(sd)) = (mean(counts), std_dev(counts)) else {
                continue;
            };
            if avg < self.min_mean {
                continue;
            }
            let cv = sd / avg;
            if cv > self.max_cv {
                findings.push(format!(
                    "{}.{} (CV: {:.1}%, mean {} objects/node)",
                    namespace,
                    set,
                    cv * 100.0,
                    fmt_num(avg.round())
                ));
            }
        }

        if findings.is_empty() {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                format!("Object counts are balanced across nodes for {} set(s).", by_set.len()),
            ));
        }
        Ok(RuleVerdict::warning(
            self.id(),
            self.name(),
            format!("Uneven set distribution: {}", findings.join(" | ")),
            "Object counts for a set should be near-identical on every node. Skew suggests \
             pending migrations, a recent node addition or a hot digest range; confirm \
             migrations have completed before investigating key design.",
        ))
    }
}
