//! Shared building blocks for bundle health checks
//!
//! The canonical fact model, the SQLite fact store, and the verdict contract
//! that the ingestion pipeline and the rule engine agree on.

pub mod config;
pub mod error;
pub mod fact;
pub mod flatten;
pub mod lookup;
pub mod run_context;
pub mod store;
pub mod verdict;

pub use config::{ArchiveConfig, ClusterCheckConfig, RuleThresholds};
pub use error::{ConfigError, StoreError};
pub use fact::{
    as_number, ClusterMetadataFact, ConfigFact, FactSource, FactTable, FeatureFact,
    NamespaceMetricFact, NodeMetricFact, SecurityConnectionFact, SetMetricFact, SystemInfoFact,
};
pub use lookup::Lookup;
pub use run_context::RunContext;
pub use store::{FactStore, Probe};
pub use verdict::{RuleStatus, RuleVerdict};
