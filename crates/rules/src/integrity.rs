//! Result aggregation and rule-catalog self-test
//!
//! One pass over the catalog serves two readers. Reporting takes the
//! findings; pipeline verification takes the schema failures, i.e. verdicts
//! that came from a query breaking rather than from a deliberate
//! `DATA_MISSING`.

use crate::rule::{evaluate, Rule, EXECUTION_ERROR_PREFIX};
use bundlecheck_core::{FactStore, RuleStatus, RuleVerdict};
use serde::Serialize;
use std::collections::BTreeMap;

/// Message fragments SQLite produces when a query outruns the schema
const SCHEMA_ERROR_MARKERS: &[&str] = &["no such table", "no such column"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// A verdict about the cluster, for end-user reporting
    Finding,
    /// The rule could not run against this store's schema
    SchemaFailure,
}

impl Classification {
    pub fn of(verdict: &RuleVerdict) -> Self {
        let message = verdict.message.to_lowercase();
        let broken = verdict.message.starts_with(EXECUTION_ERROR_PREFIX)
            || SCHEMA_ERROR_MARKERS.iter().any(|m| message.contains(m));
        if broken {
            Self::SchemaFailure
        } else {
            Self::Finding
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleOutcome {
    #[serde(flatten)]
    pub verdict: RuleVerdict,
    pub classification: Classification,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub outcomes: Vec<RuleOutcome>,
    /// Verdict count per status, schema failures included
    pub by_status: BTreeMap<RuleStatus, usize>,
    pub schema_failures: usize,
}

impl IntegrityReport {
    /// No rule broke against the schema
    pub fn is_sound(&self) -> bool {
        self.schema_failures == 0
    }

    pub fn findings(&self) -> impl Iterator<Item = &RuleVerdict> {
        self.outcomes
            .iter()
            .filter(|o| o.classification == Classification::Finding)
            .map(|o| &o.verdict)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RuleVerdict> {
        self.outcomes
            .iter()
            .filter(|o| o.classification == Classification::SchemaFailure)
            .map(|o| &o.verdict)
    }

    pub fn count(&self, status: RuleStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Evaluate every rule in order. Never fails: broken rules are reported.
pub fn run_catalog(rules: &[Box<dyn Rule>], store: &FactStore) -> IntegrityReport {
    let mut report = IntegrityReport::default();
    for rule in rules {
        let verdict = evaluate(rule.as_ref(), store);
        let classification = Classification::of(&verdict);
        if classification == Classification::SchemaFailure {
            report.schema_failures += 1;
            tracing::warn!(rule = %verdict.id, message = %verdict.message, "Rule failed against the fact store schema");
        } else {
            tracing::debug!(rule = %verdict.id, status = %verdict.status, "Rule evaluated");
        }
        *report.by_status.entry(verdict.status).or_default() += 1;
        report.outcomes.push(RuleOutcome {
            verdict,
            classification,
        });
    }
    tracing::info!(
        rules = report.outcomes.len(),
        schema_failures = report.schema_failures,
        "Rule catalog evaluated"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let ok = RuleVerdict::warning("1.a", "x", "node skewed", "fix");
        assert_eq!(Classification::of(&ok), Classification::Finding);

        let missing = RuleVerdict::data_missing("1.a", "x", "Required table 'node_metrics' is not present", "r");
        assert_eq!(Classification::of(&missing), Classification::Finding);

        let broken = RuleVerdict::critical("1.a", "x", "Execution error: boom", "r");
        assert_eq!(Classification::of(&broken), Classification::SchemaFailure);

        let sql = RuleVerdict::critical("1.a", "x", "Error: No such column: value", "r");
        assert_eq!(Classification::of(&sql), Classification::SchemaFailure);
    }
}
