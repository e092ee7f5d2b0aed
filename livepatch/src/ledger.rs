//! Version Tracker: the in-memory ledger of applied manifest versions.
//!
//! A manifest is applied at most once per `(version, timestamp)`. Fetching an
//! unchanged manifest again is a no-op; a strictly newer timestamp for a known
//! version counts as an update and is applied again.

use std::collections::HashMap;
use std::sync::Mutex;

/// Process-wide map from manifest version to the last applied timestamp.
///
/// Written only by the poll cycle after a manifest has been fully processed.
#[derive(Debug, Default)]
pub struct AppliedLedger {
    applied: Mutex<HashMap<String, i64>>,
}

impl AppliedLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// False iff `version` was already applied with a timestamp >= `timestamp`.
    pub fn should_apply(&self, version: &str, timestamp: i64) -> bool {
        let applied = self.applied.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        !applied.get(version).is_some_and(|&recorded| recorded >= timestamp)
    }

    /// Record `version` as applied at `timestamp`.
    ///
    /// An older timestamp never overwrites a newer one.
    pub fn commit(&self, version: &str, timestamp: i64) {
        let mut applied = self.applied.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let recorded = applied.entry(version.to_string()).or_insert(timestamp);
        *recorded = (*recorded).max(timestamp);
    }

    /// Last applied timestamp for `version`.
    pub fn applied_at(&self, version: &str) -> Option<i64> {
        let applied = self.applied.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        applied.get(version).copied()
    }

    /// Snapshot of every applied version, sorted by version.
    pub fn snapshot(&self) -> Vec<(String, i64)> {
        let applied = self.applied.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut entries: Vec<(String, i64)> = applied.iter().map(|(v, t)| (v.clone(), *t)).collect();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_version_applies() {
        let ledger = AppliedLedger::new();
        assert!(ledger.should_apply("1.0", 100));
    }

    #[test]
    fn test_same_or_older_timestamp_is_skipped() {
        let ledger = AppliedLedger::new();
        ledger.commit("1.0", 100);

        assert!(!ledger.should_apply("1.0", 100));
        assert!(!ledger.should_apply("1.0", 99));
        assert!(ledger.should_apply("1.0", 101));
        assert!(ledger.should_apply("1.1", 1));
    }

    #[test]
    fn test_commit_never_lowers_timestamp() {
        let ledger = AppliedLedger::new();
        ledger.commit("1.0", 200);
        ledger.commit("1.0", 150);
        assert_eq!(ledger.applied_at("1.0"), Some(200));

        ledger.commit("1.0", 250);
        assert_eq!(ledger.snapshot(), vec![("1.0".to_string(), 250)]);
    }
}
