//! The fixed rule catalog, in stable id order

use crate::checks::*;
use crate::rule::Rule;
use bundlecheck_core::RuleThresholds;

pub fn catalog(thresholds: &RuleThresholds) -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(ServiceErrorSkew::new(thresholds)),
        Box::new(NetworkAcceleration),
        Box::new(VersionConsistency),
        Box::new(CapacityCheck::new(thresholds)),
        Box::new(SprigLimit::new(thresholds)),
        Box::new(StorageDeadlock::new(thresholds)),
        Box::new(HwmCheck::disk(thresholds)),
        Box::new(HwmCheck::memory(thresholds)),
        Box::new(ConfigSymmetry),
        Box::new(ConfigDrift),
        Box::new(HotKey),
        Box::new(ReadNotFound),
        Box::new(DeleteNotFound::new(thresholds)),
        Box::new(SIndexOnFlash),
        Box::new(SetObjectSkew::new(thresholds)),
        Box::new(SecurityConnectionAudit::new(thresholds)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_ids_are_unique_and_ordered() {
        let rules = catalog(&RuleThresholds::default());
        let ids: Vec<&str> = rules.iter().map(|r| r.id()).collect();
        assert_eq!(ids.len(), 16);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids.first(), Some(&"1.a"));
        assert_eq!(ids.last(), Some(&"6.a"));
    }
}
