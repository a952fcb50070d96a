//! Errors raised inside a rule body
//!
//! None of these cross the rule boundary: [`crate::evaluate`] turns them
//! into `CRITICAL` verdicts.

use bundlecheck_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid evidence pattern: {0}")]
    Pattern(#[from] regex::Error),
}
