//! 1.b Network Acceleration Check
//!
//! Cloud VMs need the provider's accelerated NIC driver. Only AWS exposes a
//! reliable driver fingerprint in OS telemetry, so other clouds pass once
//! system telemetry is present.

use crate::error::RuleError;
use crate::rule::{no_evidence, preflight, Requirement, Rule};
use bundlecheck_core::{FactStore, FactTable, RuleVerdict};
use regex::Regex;
use std::collections::BTreeMap;

const BARE_METAL_PREFIX: &str = "Bare Metal";

/// `system_info` keys that may mention the ENA driver
pub const ENA_EVIDENCE_KEYS: &[&str] = &["network", "lsmod", "ethtool", "interrupts"];

const METADATA: &[Requirement] = &[(FactTable::ClusterMetadata, &["key", "value"])];

fn acceleration_tech(platform: &str) -> &'static str {
    match platform {
        "AWS" => "ENA (Elastic Network Adapter)",
        "Azure" => "Accelerated Networking (Mellanox/SR-IOV)",
        "GCP" => "gVNIC",
        _ => "High-Speed NIC",
    }
}

pub struct NetworkAcceleration;

impl Rule for NetworkAcceleration {
    fn id(&self) -> &'static str {
        "1.b"
    }

    fn name(&self) -> &'static str {
        "Network Acceleration Check"
    }

    fn check(&self, store: &FactStore) -> Result<RuleVerdict, RuleError> {
        if let Some(missing) = preflight(self, store, METADATA)? {
            return Ok(missing);
        }
        let Some(platform) = store.cluster_metadata("cloud_platform")? else {
            return Ok(no_evidence(self, "cloud platform classification"));
        };

        if platform.starts_with(BARE_METAL_PREFIX) {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                "Platform identified as Bare Metal. Standard high-speed NICs assumed.",
            ));
        }

        let tech = acceleration_tech(&platform);
        let sys_rows = if store.has_table(FactTable::SystemInfo.name())? {
            store.system_info()?
        } else {
            Vec::new()
        };
        if sys_rows.is_empty() {
            return Ok(RuleVerdict::warning(
                self.id(),
                self.name(),
                format!(
                    "Detected {}, but system telemetry (sys_stat) is missing from the bundle.",
                    platform
                ),
                format!(
                    "Verify manually that {} is enabled on the virtual machines to prevent latency spikes.",
                    tech
                ),
            ));
        }

        if platform != "AWS" {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                format!("Detected {}; system telemetry present for {} acceleration.", platform, tech),
            ));
        }

        let ena = Regex::new(r"(?i)\bena\b")?;
        let mut nodes: BTreeMap<&str, bool> = BTreeMap::new();
        for row in &sys_rows {
            let found = ENA_EVIDENCE_KEYS.contains(&row.metric.as_str()) && ena.is_match(&row.value);
            *nodes.entry(row.node_id.as_str()).or_default() |= found;
        }
        let missing: Vec<&str> = nodes
            .iter()
            .filter(|(_, found)| !**found)
            .map(|(node, _)| *node)
            .collect();

        if missing.is_empty() {
            return Ok(RuleVerdict::pass(
                self.id(),
                self.name(),
                format!("{} driver detected on all {} node(s).", tech, nodes.len()),
            ));
        }
        Ok(RuleVerdict::warning(
            self.id(),
            self.name(),
            format!(
                "No ENA driver evidence on {} of {} node(s): {}",
                missing.len(),
                nodes.len(),
                missing.join(", ")
            ),
            "Nitro instances need the ENA driver for full network throughput. Check with \
             'ethtool -i eth0' and 'lsmod | grep ena', or re-collect as root so driver \
             telemetry is captured.",
        ))
    }
}
