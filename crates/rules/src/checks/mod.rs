//! The individual checks, grouped by the concern they inspect

mod capacity;
mod config;
mod network;
mod security;
mod skew;
mod storage;
mod traffic;
mod version;

pub use capacity::{CapacityCheck, HwmCheck};
pub use config::{ConfigDrift, ConfigSymmetry};
pub use network::NetworkAcceleration;
pub use security::SecurityConnectionAudit;
pub use skew::{ServiceErrorSkew, SetObjectSkew};
pub use storage::{SIndexOnFlash, SprigLimit, StorageDeadlock};
pub use traffic::{DeleteNotFound, HotKey, ReadNotFound};
pub use version::VersionConsistency;

use crate::error::RuleError;
use crate::rule::Requirement;
use bundlecheck_core::{FactStore, FactTable};

pub(crate) const NODE_CONFIGS: &[Requirement] = &[(
    FactTable::NodeConfigs,
    &["node_id", "config_name", "value"],
)];

/// A namespace-scoped config leaf: `namespace.<ns>.[...].<setting>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NamespaceSetting {
    pub node_id: String,
    pub namespace: String,
    pub setting: String,
    pub value: String,
}

impl NamespaceSetting {
    pub fn key(&self) -> (String, String) {
        (self.node_id.clone(), self.namespace.clone())
    }

    fn parse(node_id: String, config_name: &str, value: String) -> Option<Self> {
        let rest = config_name.strip_prefix("namespace.")?;
        let (namespace, path) = rest.split_once('.')?;
        let setting = path.rsplit('.').next()?;
        Some(Self {
            node_id,
            namespace: namespace.to_string(),
            setting: setting.to_string(),
            value,
        })
    }
}

pub(crate) fn namespace_settings(store: &FactStore) -> Result<Vec<NamespaceSetting>, RuleError> {
    Ok(store
        .node_configs()?
        .into_iter()
        .filter_map(|f| NamespaceSetting::parse(f.node_id, &f.config_name, f.value))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_setting_parse() {
        let s = NamespaceSetting::parse(
            "n1".to_string(),
            "namespace.test.service.storage-engine.defrag-lwm-pct",
            "50".to_string(),
        )
        .unwrap();
        assert_eq!(s.namespace, "test");
        assert_eq!(s.setting, "defrag-lwm-pct");

        assert!(NamespaceSetting::parse("n1".into(), "namespace.test", "x".into()).is_none());
        assert!(NamespaceSetting::parse("n1".into(), "service.x", "y".into()).is_none());
    }
}
