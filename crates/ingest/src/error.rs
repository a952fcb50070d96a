//! Error types for archive resolution and extraction

use bundlecheck_core::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Terminal failure to obtain the telemetry document from a bundle
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt archive container: {0}")]
    Container(String),

    #[error("No telemetry entry found in {path} (markers: {markers})")]
    NoTelemetryFound { path: PathBuf, markers: String },

    #[error("Failed to unwrap inner zip in {entry}: {source}")]
    InnerZip {
        entry: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to decompress {entry}: {source}")]
    Gzip {
        entry: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Telemetry payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Telemetry payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure inside a single extractor; isolated by the pipeline
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Unexpected telemetry shape at {path}: {detail}")]
    Shape { path: String, detail: String },

    #[error("Extractor panicked: {0}")]
    Panicked(String),
}

/// Static configuration file that could not be parsed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StaticConfigError {
    #[error("Unmatched closing brace at line {line}")]
    UnmatchedBrace { line: usize },

    #[error("Stanza '{stanza}' is never closed")]
    UnclosedStanza { stanza: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Telemetry document is not an object at {level} level")]
    Document { level: &'static str },
}
