//! Rule contract and the per-rule evaluation boundary

use crate::error::RuleError;
use bundlecheck_core::{FactStore, FactTable, Probe, RuleVerdict};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Prefix of every verdict produced by a contained rule failure
pub const EXECUTION_ERROR_PREFIX: &str = "Execution error:";

/// A self-contained diagnostic check over the fact store
pub trait Rule {
    /// Stable catalog identifier, e.g. `2.c`
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    /// Produce a verdict. Must not write to the store.
    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError>;
}

/// Run `rule` and always come back with a verdict.
///
/// Errors and panics raised by the rule body become `CRITICAL` verdicts
/// whose message starts with [`EXECUTION_ERROR_PREFIX`].
pub fn evaluate(rule: &dyn Rule, store: &FactStore) -> RuleVerdict {
    match panic::catch_unwind(AssertUnwindSafe(|| rule.check(store))) {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => {
            tracing::warn!(rule = rule.id(), "Rule failed: {}", e);
            execution_error(rule, &e.to_string())
        }
        Err(payload) => {
            let detail = panic_detail(payload.as_ref());
            tracing::error!(rule = rule.id(), "Rule panicked: {}", detail);
            execution_error(rule, &format!("panic: {}", detail))
        }
    }
}

fn execution_error(rule: &dyn Rule, detail: &str) -> RuleVerdict {
    RuleVerdict::critical(
        rule.id(),
        rule.name(),
        format!("{} {}", EXECUTION_ERROR_PREFIX, detail),
        "The rule could not complete against this fact store. Re-run ingestion \
         with the current pipeline and report the error if it persists.",
    )
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================================
// Preflight
// ============================================================================

/// A table and the columns a rule reads from it
pub type Requirement = (FactTable, &'static [&'static str]);

const RECOLLECT_GUIDANCE: &str = "Re-collect the bundle with a current collector run as a \
     privileged user so that this telemetry is captured, then re-run ingestion.";

/// Schema-safety preflight.
///
/// Returns a `DATA_MISSING` verdict naming the first unmet requirement, or
/// `None` when every table and column is present.
pub fn preflight<R: Rule + ?Sized>(
    rule: &R,
    store: &FactStore,
    requirements: &[Requirement],
) -> Result<Option<RuleVerdict>, RuleError> {
    for (table, columns) in requirements {
        let message = match store.probe(*table, columns)? {
            Probe::Ready => continue,
            Probe::MissingTable(name) => format!("Required table '{}' is not present in the fact store.", name),
            Probe::MissingColumn { table, column } => {
                format!("Required column '{}.{}' is not present in the fact store.", table, column)
            }
        };
        return Ok(Some(RuleVerdict::data_missing(
            rule.id(),
            rule.name(),
            message,
            RECOLLECT_GUIDANCE,
        )));
    }
    Ok(None)
}

/// `DATA_MISSING` for a rule whose tables exist but hold none of its metrics
pub fn no_evidence<R: Rule + ?Sized>(rule: &R, what: &str) -> RuleVerdict {
    RuleVerdict::data_missing(
        rule.id(),
        rule.name(),
        format!("No {} found in this bundle.", what),
        RECOLLECT_GUIDANCE,
    )
}

// ============================================================================
// Numeric helpers
// ============================================================================

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Render a number without a trailing `.0` for whole values
pub fn fmt_num(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}
