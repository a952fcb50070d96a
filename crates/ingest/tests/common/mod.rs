//! Bundle fixtures shared by the ingestion integration tests

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

/// Two-node modern telemetry document
pub fn telemetry() -> Value {
    let node = |uptime: u64, proxy_errors: u64, objects: u64| {
        json!({
            "as_stat": {
                "meta_data": {"asd_build": "7.2.0.1"},
                "statistics": {
                    "service": {
                        "uptime": uptime,
                        "client_proxy_error": proxy_errors,
                        "stat_read_reqs": 1000
                    },
                    "namespace": {
                        "test": {"service": {"data_used_pct": 41, "memory_used_pct": 22}}
                    },
                    "set": {"test": {"users": {"objects": objects}}}
                },
                "config": {
                    "service": {"proto-fd-max": 15000, "cluster-name": "prod"},
                    "network": {"service": {"port": 3000}},
                    "namespace": {"test": {"service": {
                        "replication-factor": 2,
                        "storage-engine": "device",
                        "high-water-disk-pct": 50,
                        "defrag-lwm-pct": 55
                    }}}
                },
                "acl": {"users": {"app": {"connections": 40}}}
            },
            "sys_stat": {"uname": "Linux ip-10-0-0-1 5.10", "lsmod": "ena 131072 0"}
        })
    };

    json!({
        "2026-01-20 23:00:14": {
            "prod": {
                "10.0.0.1:3000": node(100, 10, 5000),
                "10.0.0.2:3000": node(101, 12, 5100)
            }
        }
    })
}

/// `value` serialized and right-padded with whitespace to exactly `size` bytes
pub fn padded_json(value: &Value, size: usize) -> Vec<u8> {
    let mut bytes = serde_json::to_vec(value).unwrap();
    assert!(bytes.len() <= size, "fixture larger than requested size");
    bytes.resize(size, b' ');
    bytes
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

pub fn tar_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, data.as_slice()).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn tgz_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    gzip(&tar_bytes(entries))
}

pub fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        for (name, data) in entries {
            writer
                .start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
    buf.into_inner()
}

pub fn write_bundle(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// A gzip-compressed tar carrying the standard telemetry document
pub fn standard_bundle(dir: &Path) -> PathBuf {
    let payload = serde_json::to_vec(&telemetry()).unwrap();
    let bytes = tgz_bytes(&[
        ("collect/manifest.json", padded_json(&json!({"files": 2}), 200)),
        ("collect/20260120_230014_ascinfo.json", payload),
    ]);
    write_bundle(dir, "bundle.tgz", &bytes)
}
