//! Ingest a telemetry document, then run the catalog over the result

use bundlecheck_core::{FactStore, RuleThresholds, RunContext};
use bundlecheck_ingest::Pipeline;
use bundlecheck_rules::{catalog, run_catalog, IntegrityReport, RuleStatus};
use serde_json::{json, Value};

fn node(data_used_pct: u64, proto_fd_max: u64, proxy_errors: u64) -> Value {
    json!({
        "as_stat": {
            "meta_data": {"asd_build": "7.2.0.1"},
            "statistics": {
                "service": {"client_proxy_error": proxy_errors, "stat_read_reqs": 1000},
                "namespace": {"test": {"service": {
                    "data_used_pct": data_used_pct,
                    "memory_used_pct": 22,
                    "client_write_error_key_busy": 0,
                    "client_delete_not_found": 10
                }}},
                "set": {"test": {"users": {"objects": 5000}}}
            },
            "config": {
                "service": {"proto-fd-max": proto_fd_max, "node-id": format!("BB9{}", proto_fd_max)},
                "namespace": {"test": {"service": {
                    "high-water-disk-pct": 50,
                    "defrag-lwm-pct": 55
                }}}
            },
            "acl": {"users": {"app": {"connections": 40}}}
        },
        "sys_stat": {"uname": "Linux 5.10"}
    })
}

fn evaluate(doc: &Value) -> IntegrityReport {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("facts.db");
    {
        let store = FactStore::create(&path).unwrap();
        let summary = Pipeline::default()
            .ingest_document(doc, &store, &RunContext::new("bundle.tgz"), None)
            .unwrap();
        assert!(summary.is_complete(), "failures: {:?}", summary.failures);
    }
    let store = FactStore::open_read_only(&path).unwrap();
    run_catalog(&catalog(&RuleThresholds::default()), &store)
}

fn status_of(report: &IntegrityReport, id: &str) -> RuleStatus {
    report
        .outcomes
        .iter()
        .find(|o| o.verdict.id == id)
        .map(|o| o.verdict.status)
        .unwrap_or_else(|| panic!("rule {} not in report", id))
}

#[test]
fn test_healthy_cluster() {
    let doc = json!({"2026-01-20 23:00:14": {"prod": {
        "10.0.0.1:3000": node(41, 15000, 10),
        "10.0.0.2:3000": node(43, 15000, 12)
    }}});
    let report = evaluate(&doc);

    assert!(report.is_sound());
    for id in ["1.a", "1.b", "1.c", "2.a", "2.b", "2.c", "2.d", "2.e", "3.a", "4.a", "4.c", "4.f", "6.a"] {
        assert_eq!(status_of(&report, id), RuleStatus::Pass, "rule {}", id);
    }
    // No static configuration file in the bundle
    assert_eq!(status_of(&report, "3.b"), RuleStatus::DataMissing);
}

#[test]
fn test_unhealthy_cluster() {
    let doc = json!({"2026-01-20 23:00:14": {"prod": {
        "10.0.0.1:3000": node(41, 15000, 10),
        "10.0.0.2:3000": node(78, 20000, 10),
        "10.0.0.3:3000": node(40, 15000, 10),
        "10.0.0.4:3000": node(40, 15000, 250)
    }}});
    let report = evaluate(&doc);

    assert!(report.is_sound());
    assert_eq!(status_of(&report, "1.a"), RuleStatus::Warning);
    assert_eq!(status_of(&report, "2.a"), RuleStatus::Warning);
    assert_eq!(status_of(&report, "2.d"), RuleStatus::Critical);

    let symmetry = report
        .findings()
        .find(|v| v.id == "3.a")
        .unwrap();
    assert_eq!(symmetry.status, RuleStatus::Warning);
    assert!(symmetry.message.contains("service.proto-fd-max"));
    assert!(!symmetry.message.contains("node-id"));
}

#[test]
fn test_reingest_into_same_store_keeps_verdicts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("facts.db");
    let doc = json!({"2026-01-20 23:00:14": {"prod": {
        "10.0.0.1:3000": {"as_stat": {"statistics": {
            "service": {"uptime": 10},
            "namespace": {"test": {"service": {"client_delete_not_found": 600000}}}
        }}}
    }}});
    let rule = bundlecheck_rules::checks::DeleteNotFound::new(&RuleThresholds::default());

    let ingest_and_check = |store: FactStore| {
        Pipeline::default()
            .ingest_document(&doc, &store, &RunContext::new("bundle.tgz"), None)
            .unwrap();
        bundlecheck_rules::evaluate(&rule, &store)
    };
    let verdicts = [
        ingest_and_check(FactStore::create(&path).unwrap()),
        ingest_and_check(FactStore::open(&path).unwrap()),
    ];

    assert_eq!(verdicts[0].status, RuleStatus::Pass);
    assert_eq!(verdicts[1], verdicts[0]);
    assert!(verdicts[1].message.contains("600,000"));
}
