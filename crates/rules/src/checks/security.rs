//! 6.a Security Connection Audit: one user holding most client connections

use crate::error::RuleError;
use crate::rule::{fmt_num, preflight, Requirement, Rule};
use bundlecheck_core::{FactStore, FactTable, RuleThresholds, RuleVerdict};
use std::collections::BTreeMap;

const SECURITY_CONNECTIONS: &[Requirement] = &[(
    FactTable::SecurityConnections,
    &["node_id", "user", "connection_count"],
)];

const ACL_GUIDANCE: &str = "This check requires Enterprise Edition ACL telemetry. Verify the \
     cluster runs Enterprise Edition with security enabled and that the collector user may \
     read per-user connection statistics.";

pub struct SecurityConnectionAudit {
    monopoly_pct: f64,
    monopoly_floor: f64,
}

impl SecurityConnectionAudit {
    pub fn new(thresholds: &RuleThresholds) -> Self {
        Self {
            monopoly_pct: thresholds.connection_monopoly_pct,
            monopoly_floor: thresholds.connection_monopoly_floor,
        }
    }
}

impl Rule for SecurityConnectionAudit {
    fn id(&self) -> &'static str {
        "6.a"
    }

    fn name(&self) -> &'static str {
        "Security Connection Audit"
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(mut missing) = preflight(self, store, SECURITY_CONNECTIONS)? {
            missing.message = format!("Security telemetry (ACL) not found. {}", missing.message);
            missing.remediation = Some(ACL_GUIDANCE.to_string());
            return Ok(missing);
        }

        let mut per_user: BTreeMap<String, i64> = BTreeMap::new();
        for fact in store.security_connections()? {
            *per_user.entry(fact.user).or_default() += fact.connection_count;
        }
        let total: i64 = per_user.values().sum();
        // First user wins ties, so the result does not depend on row order
        let top = per_user
            .iter()
            .fold(None::<(&String, i64)>, |best, (user, count)| match best {
                Some((_, c)) if c >= *count => best,
                _ => Some((user, *count)),
            });
        let Some((top_user, top_count)) = top.filter(|_| total > 0) else {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                "No active client connections detected via ACL telemetry.",
            ));
        };

        let share = (top_count as f64 / total as f64 * 100.0).floor();
        if share > self.monopoly_pct && top_count as f64 > self.monopoly_floor {
            return Ok(RuleVerdict::warning(
                self.id(),
                self.name(),
                format!(
                    "Connection Monopoly: User [{}] holds {}% of cluster connections ({}).",
                    top_user,
                    fmt_num(share),
                    top_count
                ),
                format!(
                    "A single account saturating client connections can starve other \
                     applications and admin tools. Audit the connection pool settings of the \
                     application using '{}', keep client max connections aligned with \
                     proto-fd-max, and look for connection leaks in long-running processes.",
                    top_user
                ),
            ));
        }
        Ok(RuleVerdict::pass(
            self.id(),
            self.name(),
            format!(
                "Connection distribution is healthy. Top user: {} ({}%).",
                top_user,
                fmt_num(share)
            ),
        ))
    }
}
