//! Rule verdict contract
//!
//! `{ id, name, status, message, remediation? }` is the only interface between
//! the rule engine and any reporting collaborator.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStatus {
    Pass,
    Warning,
    Critical,
    DataMissing,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::DataMissing => "DATA_MISSING",
        }
    }
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub id: String,
    pub name: String,
    pub status: RuleStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl RuleVerdict {
    pub fn pass(id: &str, name: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status: RuleStatus::Pass,
            message: message.into(),
            remediation: None,
        }
    }

    pub fn warning(
        id: &str,
        name: &str,
        message: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self::with_remediation(id, name, RuleStatus::Warning, message, remediation)
    }

    pub fn critical(
        id: &str,
        name: &str,
        message: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self::with_remediation(id, name, RuleStatus::Critical, message, remediation)
    }

    pub fn data_missing(
        id: &str,
        name: &str,
        message: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self::with_remediation(id, name, RuleStatus::DataMissing, message, remediation)
    }

    fn with_remediation(
        id: &str,
        name: &str,
        status: RuleStatus,
        message: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status,
            message: message.into(),
            remediation: Some(remediation.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_wire_shape() {
        let v = RuleVerdict::data_missing("3.b", "Config Drift", "no file", "bundle it");
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["status"], "DATA_MISSING");
        assert_eq!(json["remediation"], "bundle it");

        let pass = RuleVerdict::pass("1.a", "Service Error Skew", "ok");
        let json = serde_json::to_value(&pass).unwrap();
        assert!(json.get("remediation").is_none());
    }
}
