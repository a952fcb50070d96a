//! Archive Resolver: bundle container -> telemetry JSON document
//!
//! A bundle is a tar (optionally gzip-compressed) or zip container. The
//! telemetry payload is the largest entry whose name carries a telemetry
//! marker; it may itself be wrapped in an inner zip and/or gzip layer.

use crate::error::ArchiveError;
use bundlecheck_core::ArchiveConfig;
use flate2::read::GzDecoder;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
/// Local file header, empty archive, spanned archive
const ZIP_SIGNATURES: &[&[u8]] = &[b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];
/// POSIX and GNU tar headers carry `ustar` at this offset
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";

fn is_zip(data: &[u8]) -> bool {
    ZIP_SIGNATURES.iter().any(|sig| data.starts_with(sig))
}

fn is_tar(data: &[u8]) -> bool {
    data.get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()) == Some(TAR_MAGIC)
}

/// Outer container format, detected from leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Tar,
    GzipTar,
    Zip,
}

impl ContainerKind {
    /// A tar header wins over a zip signature: the first bytes of a tar are
    /// the first member's name, which may well start with `PK`.
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(GZIP_MAGIC) {
            ContainerKind::GzipTar
        } else if !is_tar(data) && is_zip(data) {
            ContainerKind::Zip
        } else {
            ContainerKind::Tar
        }
    }
}

/// Name and uncompressed size of a regular file inside the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
}

/// Everything ingestion needs from one bundle
#[derive(Debug, Clone)]
pub struct ResolvedBundle {
    /// Parsed telemetry document
    pub telemetry: Value,
    /// Container entry the document was read from
    pub entry_name: String,
    /// Bundled static configuration file, if one was shipped
    pub static_config: Option<StaticConfigText>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticConfigText {
    pub entry_name: String,
    pub text: String,
}

pub struct ArchiveResolver {
    config: ArchiveConfig,
}

impl Default for ArchiveResolver {
    fn default() -> Self {
        Self::new(ArchiveConfig::default())
    }
}

impl ArchiveResolver {
    pub fn new(config: ArchiveConfig) -> Self {
        Self { config }
    }

    /// Parsed telemetry document of the bundle at `path`
    pub fn resolve(&self, path: &Path) -> Result<Value, ArchiveError> {
        Ok(self.resolve_bundle(path)?.telemetry)
    }

    pub fn resolve_bundle(&self, path: &Path) -> Result<ResolvedBundle, ArchiveError> {
        let data = std::fs::read(path)?;
        let kind = ContainerKind::detect(&data);
        tracing::debug!(path = %path.display(), ?kind, bytes = data.len(), "Opening bundle");

        let entries = list_entries(kind, &data)?;
        let telemetry_entry = self.select_telemetry(&entries).ok_or_else(|| {
            ArchiveError::NoTelemetryFound {
                path: path.to_path_buf(),
                markers: self.config.telemetry_markers.join(", "),
            }
        })?;
        let static_entry = self.select_static_config(&entries);

        let mut wanted = vec![telemetry_entry.name.as_str()];
        if let Some(entry) = static_entry {
            wanted.push(entry.name.as_str());
        }
        let mut contents = read_entries(kind, &data, &wanted)?;

        let payload = contents
            .remove(&telemetry_entry.name)
            .ok_or_else(|| ArchiveError::Container(format!("entry vanished: {}", telemetry_entry.name)))?;
        tracing::info!(
            entry = %telemetry_entry.name,
            size = telemetry_entry.size,
            candidates = entries.len(),
            "Selected telemetry entry"
        );
        let telemetry = decode_payload(&telemetry_entry.name, payload)?;

        let static_config = static_entry.and_then(|entry| {
            let bytes = contents.remove(&entry.name)?;
            match String::from_utf8(bytes) {
                Ok(text) => Some(StaticConfigText {
                    entry_name: entry.name.clone(),
                    text,
                }),
                Err(e) => {
                    tracing::warn!(entry = %entry.name, "Ignoring non UTF-8 static config: {}", e);
                    None
                }
            }
        });

        Ok(ResolvedBundle {
            telemetry,
            entry_name: telemetry_entry.name.clone(),
            static_config,
        })
    }

    /// Largest entry whose name carries a telemetry marker and no exclude marker
    pub fn select_telemetry<'a>(&self, entries: &'a [EntryInfo]) -> Option<&'a EntryInfo> {
        largest(entries.iter().filter(|e| self.is_candidate(&e.name)))
    }

    fn select_static_config<'a>(&self, entries: &'a [EntryInfo]) -> Option<&'a EntryInfo> {
        let suffix = self.config.static_config_suffix.to_lowercase();
        if suffix.is_empty() {
            return None;
        }
        largest(
            entries
                .iter()
                .filter(|e| e.name.to_lowercase().ends_with(&suffix)),
        )
    }

    fn is_candidate(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        let marked = self
            .config
            .telemetry_markers
            .iter()
            .any(|m| lower.contains(&m.to_lowercase()));
        let excluded = self
            .config
            .exclude_markers
            .iter()
            .any(|m| lower.contains(&m.to_lowercase()));
        marked && !excluded
    }
}

/// First entry of maximal size
fn largest<'a>(entries: impl Iterator<Item = &'a EntryInfo>) -> Option<&'a EntryInfo> {
    entries.fold(None::<&'a EntryInfo>, |best, entry| match best {
        Some(b) if b.size >= entry.size => Some(b),
        _ => Some(entry),
    })
}

// ============================================================================
// Container access
// ============================================================================

fn container_err(e: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::Container(e.to_string())
}

fn list_entries(kind: ContainerKind, data: &[u8]) -> Result<Vec<EntryInfo>, ArchiveError> {
    match kind {
        ContainerKind::Tar => list_tar(data),
        ContainerKind::GzipTar => list_tar(GzDecoder::new(data)),
        ContainerKind::Zip => {
            let mut archive = zip::ZipArchive::new(Cursor::new(data)).map_err(container_err)?;
            let mut out = Vec::with_capacity(archive.len());
            for i in 0..archive.len() {
                let file = archive.by_index_raw(i).map_err(container_err)?;
                if file.is_dir() {
                    continue;
                }
                out.push(EntryInfo {
                    name: file.name().to_string(),
                    size: file.size(),
                });
            }
            Ok(out)
        }
    }
}

fn list_tar<R: Read>(reader: R) -> Result<Vec<EntryInfo>, ArchiveError> {
    let mut archive = tar::Archive::new(reader);
    let mut out = Vec::new();
    for entry in archive.entries().map_err(container_err)? {
        let entry = entry.map_err(container_err)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path().map_err(container_err)?.to_string_lossy().into_owned();
        out.push(EntryInfo {
            name,
            size: entry.size(),
        });
    }
    Ok(out)
}

/// Read the named entries in a single pass over the container
fn read_entries(
    kind: ContainerKind,
    data: &[u8],
    names: &[&str],
) -> Result<HashMap<String, Vec<u8>>, ArchiveError> {
    match kind {
        ContainerKind::Tar => read_tar(data, names),
        ContainerKind::GzipTar => read_tar(GzDecoder::new(data), names),
        ContainerKind::Zip => {
            let mut archive = zip::ZipArchive::new(Cursor::new(data)).map_err(container_err)?;
            let mut out = HashMap::new();
            for name in names {
                let mut file = archive.by_name(name).map_err(container_err)?;
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                out.insert(name.to_string(), buf);
            }
            Ok(out)
        }
    }
}

fn read_tar<R: Read>(reader: R, names: &[&str]) -> Result<HashMap<String, Vec<u8>>, ArchiveError> {
    let mut archive = tar::Archive::new(reader);
    let mut out = HashMap::new();
    for entry in archive.entries().map_err(container_err)? {
        let mut entry = entry.map_err(container_err)?;
        let name = entry.path().map_err(container_err)?.to_string_lossy().into_owned();
        if !names.contains(&name.as_str()) || out.contains_key(&name) {
            continue;
        }
        // Header sizes are untrusted; let the reader grow the buffer
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).map_err(container_err)?;
        out.insert(name, buf);
        if out.len() == names.len() {
            break;
        }
    }
    Ok(out)
}

// ============================================================================
// Payload decoding
// ============================================================================

/// Unwrap an optional inner zip, then an optional gzip layer, then parse JSON
pub fn decode_payload(entry: &str, mut bytes: Vec<u8>) -> Result<Value, ArchiveError> {
    if entry.to_lowercase().ends_with(".zip") || is_zip(&bytes) {
        bytes = first_zip_member(entry, &bytes)?;
    }
    if bytes.starts_with(GZIP_MAGIC) {
        let mut decoded = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|source| ArchiveError::Gzip {
                entry: entry.to_string(),
                source,
            })?;
        bytes = decoded;
    }
    let text = String::from_utf8(bytes)?;
    Ok(serde_json::from_str(&text)?)
}

fn first_zip_member(entry: &str, bytes: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let inner_err = |source| ArchiveError::InnerZip {
        entry: entry.to_string(),
        source,
    };
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(inner_err)?;
    let mut file = archive.by_index(0).map_err(inner_err)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn entry(name: &str, size: u64) -> EntryInfo {
        EntryInfo {
            name: name.to_string(),
            size,
        }
    }

    #[test]
    fn test_detect_container_kind() {
        assert_eq!(ContainerKind::detect(&[0x1f, 0x8b, 0x08]), ContainerKind::GzipTar);
        assert_eq!(ContainerKind::detect(b"PK\x03\x04"), ContainerKind::Zip);
        assert_eq!(ContainerKind::detect(b"ustar"), ContainerKind::Tar);
        assert_eq!(ContainerKind::detect(&[]), ContainerKind::Tar);
    }

    #[test]
    fn test_tar_member_named_like_zip_is_still_tar() {
        let mut header = vec![0u8; 512];
        header[..8].copy_from_slice(b"PKG-INFO");
        header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5].copy_from_slice(TAR_MAGIC);
        assert_eq!(ContainerKind::detect(&header), ContainerKind::Tar);

        // Two bytes of `PK` alone are not a zip signature
        assert_eq!(ContainerKind::detect(b"PKG-INFO"), ContainerKind::Tar);
    }

    #[test]
    fn test_select_prefers_largest_candidate() {
        let resolver = ArchiveResolver::default();
        let entries = vec![
            entry("bundle/manifest.json", 200),
            entry("bundle/20260120_ascinfo.json", 50_000),
            entry("bundle/small.json", 10),
            entry("bundle/sysinfo.log", 900_000),
        ];
        let chosen = resolver.select_telemetry(&entries).unwrap();
        assert_eq!(chosen.name, "bundle/20260120_ascinfo.json");
    }

    #[test]
    fn test_manifest_is_never_a_candidate() {
        let resolver = ArchiveResolver::default();
        let entries = vec![entry("MANIFEST.json", 1_000_000), entry("notes.txt", 5)];
        assert!(resolver.select_telemetry(&entries).is_none());
    }

    #[test]
    fn test_decode_plain_json() {
        let value = decode_payload("a.json", br#"{"ts": {}}"#.to_vec()).unwrap();
        assert!(value.get("ts").is_some());
    }

    #[test]
    fn test_decode_gzip_json() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(br#"{"ts": {"c": {}}}"#).unwrap();
        let bytes = enc.finish().unwrap();

        let value = decode_payload("ascinfo.json.gz", bytes).unwrap();
        assert!(value["ts"]["c"].is_object());
    }

    #[test]
    fn test_decode_inner_zip_by_magic() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            writer
                .start_file("ascinfo.json", zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(br#"{"wrapped": true}"#).unwrap();
            writer.finish().unwrap();
        }
        let value = decode_payload("ascinfo.json", buf.into_inner()).unwrap();
        assert_eq!(value["wrapped"], Value::Bool(true));
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let err = decode_payload("ascinfo.json", b"not json".to_vec()).unwrap_err();
        assert!(matches!(err, ArchiveError::Json(_)));

        let err = decode_payload("ascinfo.json.zip", b"nope".to_vec()).unwrap_err();
        assert!(matches!(err, ArchiveError::InnerZip { .. }));
    }
}
