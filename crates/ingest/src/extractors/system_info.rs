//! Operating-system telemetry, stored unflattened

use super::{Extractor, SYSTEM_SUBTREE};
use crate::error::ExtractorError;
use bundlecheck_core::flatten::leaf_text;
use bundlecheck_core::{FactStore, Lookup, RunContext, SystemInfoFact};
use serde_json::Value;

pub struct SystemInfoExtractor;

impl Extractor for SystemInfoExtractor {
    fn name(&self) -> &'static str {
        "system_info"
    }

    fn extract(
        &self,
        node_id: &str,
        node: &Value,
        store: &FactStore,
        run: &RunContext,
    ) -> Result<(), ExtractorError> {
        let Some(sys) = Lookup::at(node, &[SYSTEM_SUBTREE]).object() else {
            return Ok(());
        };

        let facts: Vec<SystemInfoFact> = sys
            .iter()
            .map(|(metric, value)| SystemInfoFact {
                node_id: node_id.to_string(),
                metric: metric.clone(),
                value: leaf_text(value),
            })
            .collect();

        store.insert_system_info(run, &facts)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_one_row_per_top_level_key() {
        let store = FactStore::open_in_memory().unwrap();
        let run = RunContext::new("t.tgz");
        let node = json!({"sys_stat": {
            "lsmod": "ena 123 0",
            "meminfo": {"MemTotal": 1024}
        }});

        SystemInfoExtractor.extract("n1", &node, &store, &run).unwrap();

        let rows = store.system_info().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].metric, "lsmod");
        assert_eq!(rows[0].value, "ena 123 0");
        assert_eq!(rows[1].value, r#"{"MemTotal":1024}"#);
    }
}
