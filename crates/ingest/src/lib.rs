//! Bundle ingestion
//!
//! Resolves the telemetry payload inside a diagnostic bundle and normalizes
//! it into the canonical fact store through an ordered set of extractors.

pub mod archive;
pub mod error;
pub mod extractors;
pub mod pipeline;
pub mod static_config;

pub use archive::{ArchiveResolver, ContainerKind, EntryInfo, ResolvedBundle, StaticConfigText};
pub use error::{ArchiveError, ExtractorError, IngestError, StaticConfigError};
pub use extractors::{Extractor, ExtractorRegistry, NodeOutcome};
pub use pipeline::{ExtractorFailure, IngestSummary, Pipeline};
