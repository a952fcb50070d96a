//! Run context: one per ingestion invocation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Identity of a single ingestion run.
///
/// Created once per invocation and never mutated; every fact written during
/// the run carries its `run_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    run_id: String,
    source_bundle_path: PathBuf,
    discovered_at: DateTime<Utc>,
}

impl RunContext {
    /// Start a new run with a fresh random id
    pub fn new(source_bundle_path: impl AsRef<Path>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            source_bundle_path: source_bundle_path.as_ref().to_path_buf(),
            discovered_at: Utc::now(),
        }
    }

    /// Rebuild a context that was previously recorded in a store
    pub fn from_parts(
        run_id: impl Into<String>,
        source_bundle_path: impl Into<PathBuf>,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            source_bundle_path: source_bundle_path.into(),
            discovered_at,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn source_bundle_path(&self) -> &Path {
        &self.source_bundle_path
    }

    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }
}
