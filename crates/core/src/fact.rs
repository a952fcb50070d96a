//! Canonical fact rows
//!
//! Every table is vertically shaped (key/value pairs scoped by run, node and
//! context). Values are kept as text; numeric interpretation happens at rule
//! evaluation time through [`as_number`].

use serde::{Deserialize, Serialize};

/// Provenance of a metric or configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
    /// Runtime statistics reported by the node
    Statistic,
    /// Runtime configuration reported by the node
    Config,
    /// Static configuration file shipped inside the bundle
    File,
}

impl FactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Statistic => "statistics",
            Self::Config => "config",
            Self::File => "file",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "statistics" => Some(Self::Statistic),
            "config" => Some(Self::Config),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// Tables owned by the fact store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FactTable {
    RunContext,
    NodeMetrics,
    NamespaceMetrics,
    SetMetrics,
    NodeConfigs,
    StaticConfigs,
    ActiveFeatures,
    ClusterMetadata,
    SecurityConnections,
    SystemInfo,
}

impl FactTable {
    pub const ALL: [FactTable; 10] = [
        FactTable::RunContext,
        FactTable::NodeMetrics,
        FactTable::NamespaceMetrics,
        FactTable::SetMetrics,
        FactTable::NodeConfigs,
        FactTable::StaticConfigs,
        FactTable::ActiveFeatures,
        FactTable::ClusterMetadata,
        FactTable::SecurityConnections,
        FactTable::SystemInfo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::RunContext => "run_context",
            Self::NodeMetrics => "node_metrics",
            Self::NamespaceMetrics => "namespace_metrics",
            Self::SetMetrics => "set_metrics",
            Self::NodeConfigs => "node_configs",
            Self::StaticConfigs => "static_configs",
            Self::ActiveFeatures => "active_features",
            Self::ClusterMetadata => "cluster_metadata",
            Self::SecurityConnections => "security_connections",
            Self::SystemInfo => "system_info",
        }
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table
    pub fn ddl(&self) -> &'static str {
        match self {
            Self::RunContext => {
                "CREATE TABLE IF NOT EXISTS run_context (
                    run_id TEXT PRIMARY KEY,
                    source_bundle_path TEXT NOT NULL,
                    discovered_at TEXT NOT NULL
                )"
            }
            Self::NodeMetrics => {
                "CREATE TABLE IF NOT EXISTS node_metrics (
                    run_id TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    metric_key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    source TEXT NOT NULL
                )"
            }
            Self::NamespaceMetrics => {
                "CREATE TABLE IF NOT EXISTS namespace_metrics (
                    run_id TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    namespace TEXT NOT NULL,
                    metric_key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    source TEXT NOT NULL
                )"
            }
            Self::SetMetrics => {
                "CREATE TABLE IF NOT EXISTS set_metrics (
                    run_id TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    namespace TEXT NOT NULL,
                    set_name TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (run_id, node_id, namespace, set_name, key)
                )"
            }
            Self::NodeConfigs => {
                "CREATE TABLE IF NOT EXISTS node_configs (
                    run_id TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    config_name TEXT NOT NULL,
                    value TEXT NOT NULL,
                    source TEXT NOT NULL
                )"
            }
            Self::StaticConfigs => {
                "CREATE TABLE IF NOT EXISTS static_configs (
                    run_id TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    config_name TEXT NOT NULL,
                    value TEXT NOT NULL,
                    source TEXT NOT NULL
                )"
            }
            Self::ActiveFeatures => {
                "CREATE TABLE IF NOT EXISTS active_features (
                    run_id TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    feature_name TEXT NOT NULL,
                    PRIMARY KEY (run_id, node_id, feature_name)
                )"
            }
            Self::ClusterMetadata => {
                "CREATE TABLE IF NOT EXISTS cluster_metadata (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                )"
            }
            Self::SecurityConnections => {
                "CREATE TABLE IF NOT EXISTS security_connections (
                    node_id TEXT NOT NULL,
                    user TEXT NOT NULL,
                    connection_count INTEGER NOT NULL,
                    run_id TEXT NOT NULL,
                    PRIMARY KEY (node_id, user, run_id)
                )"
            }
            Self::SystemInfo => {
                "CREATE TABLE IF NOT EXISTS system_info (
                    run_id TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    metric TEXT NOT NULL,
                    value TEXT NOT NULL
                )"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetricFact {
    pub node_id: String,
    pub metric_key: String,
    pub value: String,
    pub source: FactSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceMetricFact {
    pub node_id: String,
    pub namespace: String,
    pub metric_key: String,
    pub value: String,
    pub source: FactSource,
}

/// Per-set snapshot value; upserted by key within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMetricFact {
    pub node_id: String,
    pub namespace: String,
    pub set_name: String,
    pub key: String,
    pub value: String,
}

/// Configuration value, either live (`Config`) or from a static file (`File`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFact {
    pub node_id: String,
    pub config_name: String,
    pub value: String,
    pub source: FactSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFact {
    pub node_id: String,
    pub feature_name: String,
}

/// Cluster-wide classification, last write wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetadataFact {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConnectionFact {
    pub node_id: String,
    pub user: String,
    pub connection_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfoFact {
    pub node_id: String,
    pub metric: String,
    pub value: String,
}

/// Interpret a stored text value as a number.
///
/// Returns `None` for anything that is not a finite decimal, so callers can
/// drop non-numeric rows instead of failing on them.
pub fn as_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}
