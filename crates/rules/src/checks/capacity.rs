//! Utilization checks: capacity (2.a) and the two high-water-mark checks
//! (2.d disk, 2.e memory)

use crate::error::RuleError;
use crate::rule::{fmt_num, no_evidence, preflight, Requirement, Rule};
use bundlecheck_core::{as_number, FactStore, FactTable, RuleThresholds, RuleVerdict};

const NAMESPACE_METRICS: &[Requirement] = &[(
    FactTable::NamespaceMetrics,
    &["node_id", "namespace", "metric_key", "value"],
)];

/// One numeric namespace sample
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub node_id: String,
    pub namespace: String,
    pub metric: String,
    pub value: f64,
}

pub(crate) fn namespace_samples(store: &FactStore, keys: &[&str]) -> Result<Vec<Sample>, RuleError> {
    Ok(store
        .namespace_metrics(keys)?
        .into_iter()
        .filter_map(|f| {
            as_number(&f.value).map(|value| Sample {
                node_id: f.node_id,
                namespace: f.namespace,
                metric: f.metric_key,
                value,
            })
        })
        .collect())
}

// ============================================================================
// 2.a Capacity Check
// ============================================================================

pub const CAPACITY_METRICS: &[&str] = &["service.data_used_pct", "service.indexes_memory_used_pct"];

pub struct CapacityCheck {
    limit_pct: f64,
}

impl CapacityCheck {
    pub fn new(thresholds: &RuleThresholds) -> Self {
        Self {
            limit_pct: thresholds.capacity_pct,
        }
    }
}

impl Rule for CapacityCheck {
    fn id(&self) -> &'static str {
        "2.a"
    }

    fn name(&self) -> &'static str {
        "Capacity Check"
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, NAMESPACE_METRICS)? {
            return Ok(missing);
        }
        let samples = namespace_samples(store, CAPACITY_METRICS)?;
        if samples.is_empty() {
            return Ok(no_evidence(self, "namespace utilization metrics"));
        }

        let findings: Vec<String> = samples
            .iter()
            .filter(|s| s.value > self.limit_pct)
            .map(|s| {
                format!(
                    "{} on {} is at {}% {}",
                    s.namespace,
                    s.node_id,
                    fmt_num(s.value),
                    s.metric.trim_start_matches("service.")
                )
            })
            .collect();

        if findings.is_empty() {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                "All namespaces are well below utilization thresholds.",
            ));
        }
        Ok(RuleVerdict::warning(
            self.id(),
            self.name(),
            format!("High utilization detected: {}", findings.join(" | ")),
            "Consider increasing capacity or adjusting the high-water-mark if eviction is desired.",
        ))
    }
}

// ============================================================================
// 2.d / 2.e High-water-mark checks
// ============================================================================

pub struct HwmCheck {
    id: &'static str,
    name: &'static str,
    metric: &'static str,
    resource: &'static str,
    warning_pct: f64,
    critical_pct: f64,
}

impl HwmCheck {
    pub fn disk(thresholds: &RuleThresholds) -> Self {
        Self {
            id: "2.d",
            name: "Disk HWM Check",
            metric: "service.data_used_pct",
            resource: "disk",
            warning_pct: thresholds.disk_warning_pct,
            critical_pct: thresholds.disk_critical_pct,
        }
    }

    pub fn memory(thresholds: &RuleThresholds) -> Self {
        Self {
            id: "2.e",
            name: "Memory HWM Check",
            metric: "service.memory_used_pct",
            resource: "memory",
            warning_pct: thresholds.memory_warning_pct,
            critical_pct: thresholds.memory_critical_pct,
        }
    }
}

impl Rule for HwmCheck {
    fn id(&self) -> &'static str {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, NAMESPACE_METRICS)? {
            return Ok(missing);
        }
        let samples = namespace_samples(store, &[self.metric])?;
        let Some(worst) = samples
            .iter()
            .max_by(|a, b| a.value.total_cmp(&b.value))
        else {
            return Ok(no_evidence(self, &format!("{}-based namespace metrics", self.resource)));
        };

        if worst.value < self.warning_pct {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                format!(
                    "All namespaces are healthy. Peak {} utilization is {}% (Threshold: {}%).",
                    self.resource,
                    fmt_num(worst.value),
                    fmt_num(self.warning_pct)
                ),
            ));
        }

        let message = format!(
            "Namespace '{}' is at {}% {} capacity on node {}.",
            worst.namespace,
            fmt_num(worst.value),
            self.resource,
            worst.node_id
        );
        let remediation = format!(
            "Above the high-water mark ({}%) the server starts evicting data that has a TTL; \
             if usage keeps rising to stop-writes the cluster rejects writes. Check for data \
             skew between nodes, confirm records carry TTLs, and add {} capacity or nodes.",
            fmt_num(self.warning_pct),
            self.resource
        );
        if worst.value >= self.critical_pct {
            Ok(RuleVerdict::critical(self.id(), self.name(), message, remediation))
        } else {
            Ok(RuleVerdict::warning(self.id(), self.name(), message, remediation))
        }
    }
}
