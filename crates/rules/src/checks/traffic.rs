//! Traffic pattern checks over namespace counters (4.a, 4.b, 4.c)

use super::capacity::namespace_samples;
use crate::error::RuleError;
use crate::rule::{fmt_num, preflight, Requirement, Rule};
use bundlecheck_core::{FactStore, FactTable, RuleThresholds, RuleVerdict};

const NAMESPACE_METRICS: &[Requirement] = &[(
    FactTable::NamespaceMetrics,
    &["node_id", "namespace", "metric_key", "value"],
)];

/// Whole number with `,` thousands separators
fn grouped(value: f64) -> String {
    let digits = format!("{}", value.round().abs() as u64);
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if value < 0.0 {
        out.insert(0, '-');
    }
    out
}

fn cluster_total(store: &FactStore, metric: &str) -> Result<f64, RuleError> {
    Ok(namespace_samples(store, &[metric])?.iter().map(|s| s.value).sum())
}

// ============================================================================
// 4.a Hot Key Detection
// ============================================================================

pub struct HotKey;

impl Rule for HotKey {
    fn id(&self) -> &'static str {
        "4.a"
    }

    fn name(&self) -> &'static str {
        "Hot Key Detection"
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, NAMESPACE_METRICS)? {
            return Ok(missing);
        }
        let findings: Vec<String> = namespace_samples(store, &["service.client_write_error_key_busy"])?
            .into_iter()
            .filter(|s| s.value > 0.0)
            .map(|s| format!("{} on {} (Count: {})", s.namespace, s.node_id, fmt_num(s.value)))
            .collect();

        if findings.is_empty() {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                "No 'key busy' errors detected in this snapshot.",
            ));
        }
        Ok(RuleVerdict::warning(
            self.id(),
            self.name(),
            format!("Hot keys detected: {}", findings.join(", ")),
            "Investigate application access patterns for high-frequency keys. Consider \
             increasing transaction-pending-limit if this is expected traffic.",
        ))
    }
}

// ============================================================================
// 4.b Read Not Found Rate
// ============================================================================

pub struct ReadNotFound;

impl Rule for ReadNotFound {
    fn id(&self) -> &'static str {
        "4.b"
    }

    fn name(&self) -> &'static str {
        "Read Not Found Rate"
    }

    /// Informational: misses are normal for cache-style workloads
    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, NAMESPACE_METRICS)? {
            return Ok(missing);
        }
        let total = cluster_total(store, "service.client_read_not_found")?;
        let message = if total > 0.0 {
            format!(
                "Detected {} 'Read Not Found' events. This is expected in cache-miss workflows.",
                grouped(total)
            )
        } else {
            "No 'Read Not Found' events detected.".to_string()
        };
        Ok(RuleVerdict::pass(self.id(), self.name(), message))
    }
}

// ============================================================================
// 4.c Delete Not Found Rate
// ============================================================================

pub struct DeleteNotFound {
    ceiling: f64,
}

impl DeleteNotFound {
    pub fn new(thresholds: &RuleThresholds) -> Self {
        Self {
            ceiling: thresholds.delete_not_found_ceiling,
        }
    }
}

impl Rule for DeleteNotFound {
    fn id(&self) -> &'static str {
        "4.c"
    }

    fn name(&self) -> &'static str {
        "Delete Not Found Rate"
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, NAMESPACE_METRICS)? {
            return Ok(missing);
        }
        let total = cluster_total(store, "service.client_delete_not_found")?;
        if total <= 0.0 {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                "No unnecessary delete attempts detected.",
            ));
        }
        if total <= self.ceiling {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                format!("Minor 'Delete Not Found' volume detected ({} events).", grouped(total)),
            ));
        }
        Ok(RuleVerdict::warning(
            self.id(),
            self.name(),
            format!(
                "Detected {} 'Delete Not Found' events across the cluster.",
                grouped(total)
            ),
            "Deleting a non-existent record still costs a server transaction. Audit the \
             application for redundant delete calls and for deletes of records that already \
             expired or were evicted (check TTL and HWM settings).",
        ))
    }
}
