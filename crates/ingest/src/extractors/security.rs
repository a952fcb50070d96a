//! Per-user connection counts from the access-control subtree

use super::{engine, Extractor};
use crate::error::ExtractorError;
use bundlecheck_core::{as_number, FactStore, Lookup, RunContext, SecurityConnectionFact};
use serde_json::Value;

pub struct SecurityExtractor;

impl Extractor for SecurityExtractor {
    fn name(&self) -> &'static str {
        "security"
    }

    fn extract(
        &self,
        node_id: &str,
        node: &Value,
        store: &FactStore,
        run: &RunContext,
    ) -> Result<(), ExtractorError> {
        let users = engine(node).get(&["acl", "users"]);
        let Some(value) = users.value() else {
            // Access control is edition-gated; most bundles have none.
            return Ok(());
        };
        let Some(users) = value.as_object() else {
            return Err(ExtractorError::Shape {
                path: "as_stat.acl.users".to_string(),
                detail: "expected an object keyed by user".to_string(),
            });
        };

        let mut facts = Vec::with_capacity(users.len());
        for (user, data) in users {
            let count = match data.get("connections") {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => as_number(s),
                _ => None,
            };
            facts.push(SecurityConnectionFact {
                node_id: node_id.to_string(),
                user: user.clone(),
                connection_count: count.map_or(0, |c| c.max(0.0) as i64),
            });
        }

        store.upsert_security_connections(run, &facts)?;
        Ok(())
    }
}
