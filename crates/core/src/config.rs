//! Configuration for archive resolution and rule thresholds
//!
//! Loaded from YAML or JSON. Every field has a default, so an empty file (or
//! no file at all) yields the stock behavior.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClusterCheckConfig {
    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub rules: RuleThresholds,
}

impl ClusterCheckConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Pick the parser from the file extension (`.json`, otherwise YAML)
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_yaml_file(path),
        }
    }
}

/// How the telemetry payload is picked out of a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// An entry is a telemetry candidate if its name contains any of these
    #[serde(default = "default_telemetry_markers")]
    pub telemetry_markers: Vec<String>,

    /// Entries whose name contains any of these are never candidates
    #[serde(default = "default_exclude_markers")]
    pub exclude_markers: Vec<String>,

    /// Suffix of a bundled static configuration file
    #[serde(default = "default_static_config_suffix")]
    pub static_config_suffix: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            telemetry_markers: default_telemetry_markers(),
            exclude_markers: default_exclude_markers(),
            static_config_suffix: default_static_config_suffix(),
        }
    }
}

fn default_telemetry_markers() -> Vec<String> {
    vec!["ascinfo".to_string(), ".json".to_string()]
}

fn default_exclude_markers() -> Vec<String> {
    vec!["manifest".to_string()]
}

fn default_static_config_suffix() -> String {
    ".conf".to_string()
}

/// Numeric thresholds used by the rule catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    /// Flag a node whose errors exceed this multiple of the cluster mean
    pub error_skew_factor: f64,
    /// ...and exceed this absolute count
    pub error_skew_floor: f64,

    /// Utilization above which the capacity check warns
    pub capacity_pct: f64,

    pub disk_warning_pct: f64,
    pub disk_critical_pct: f64,

    pub memory_warning_pct: f64,
    pub memory_critical_pct: f64,

    /// Minimum acceptable defrag low-water mark
    pub defrag_lwm_floor_pct: f64,

    /// Coefficient of variation above which a set is skewed
    pub set_skew_cv: f64,
    /// Sets with a smaller mean object count are ignored
    pub set_skew_min_mean: f64,

    pub delete_not_found_ceiling: f64,

    pub connection_monopoly_pct: f64,
    pub connection_monopoly_floor: f64,

    /// Records per sprig above which an index-on-flash namespace is flagged
    pub sprig_records_limit: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            error_skew_factor: 2.0,
            error_skew_floor: 100.0,
            capacity_pct: 70.0,
            disk_warning_pct: 60.0,
            disk_critical_pct: 75.0,
            memory_warning_pct: 60.0,
            memory_critical_pct: 80.0,
            defrag_lwm_floor_pct: 40.0,
            set_skew_cv: 0.10,
            set_skew_min_mean: 1000.0,
            delete_not_found_ceiling: 1_000_000.0,
            connection_monopoly_pct: 80.0,
            connection_monopoly_floor: 100.0,
            sprig_records_limit: 64.0,
        }
    }
}
