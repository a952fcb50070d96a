//! bundlecheck_rules: the diagnostic rule catalog
//!
//! Every rule reads the canonical fact store and returns a [`RuleVerdict`].
//! Rules never write, never see each other's results, and never fail past
//! [`evaluate`].

pub mod catalog;
pub mod checks;
pub mod error;
pub mod integrity;
pub mod rule;

pub use catalog::catalog;
pub use error::RuleError;
pub use integrity::{run_catalog, Classification, IntegrityReport, RuleOutcome};
pub use rule::{evaluate, preflight, Rule, EXECUTION_ERROR_PREFIX};

pub use bundlecheck_core::{RuleStatus, RuleVerdict};
