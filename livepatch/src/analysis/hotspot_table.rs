//! Hotspot aggregation for slow call sites.
//!
//! Every intercepted call whose elapsed time exceeds the threshold bumps a
//! counter keyed by call-site signature. Caller threads record concurrently,
//! so the table is a sharded map of atomic counters.
//!
//! # Data Flow
//!
//! ```text
//! profiling advice (on_exit, elapsed > threshold)
//!     │
//!     └──► HotspotTable.record(signature)
//!              │
//!              ├──► counter += 1
//!              └──► every 10th distinct signature: top-5 snapshot to the log
//! ```
//!
//! # Performance
//!
//! - `record()`: one shard lock on first sight of a signature, then a
//!   relaxed atomic increment
//! - `entries_sorted()`: O(n log n) over distinct signatures

use dashmap::DashMap;
use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// CONSTANTS
// =============================================================================

/// A snapshot is logged each time the distinct signature count reaches a
/// multiple of this.
pub const SNAPSHOT_EVERY_DISTINCT: usize = 10;

/// Entries shown in a snapshot.
pub const SNAPSHOT_TOP_N: usize = 5;

// =============================================================================
// HOTSPOT ENTRY (OUTPUT TYPE)
// =============================================================================

/// One row of the hotspot report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotspotEntry {
    /// Call-site signature, e.g. `com.example.Billing.charge(int)`.
    pub signature: String,
    pub hits: u64,
}

/// What a single `record` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First hit for this signature.
    NewSignature { distinct: usize },
    Incremented { hits: u64 },
}

// =============================================================================
// HOTSPOT TABLE (AGGREGATOR)
// =============================================================================

#[derive(Debug, Default)]
pub struct HotspotTable {
    counters: DashMap<String, AtomicU64>,
}

impl HotspotTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one slow call for `signature`.
    ///
    /// The distinct count in [`RecordOutcome::NewSignature`] is read after the
    /// insert, so under concurrent inserts it is approximate: a snapshot may
    /// be logged twice or skipped. Hit counts are always exact.
    pub fn record(&self, signature: &str) -> RecordOutcome {
        if let Some(counter) = self.counters.get(signature) {
            let hits = counter.fetch_add(1, Ordering::Relaxed) + 1;
            return RecordOutcome::Incremented { hits };
        }

        // Two threads can race past the fast path; only the inserter reports
        // a new signature.
        let mut inserted = false;
        let hits = self
            .counters
            .entry(signature.to_string())
            .or_insert_with(|| {
                inserted = true;
                AtomicU64::new(0)
            })
            .fetch_add(1, Ordering::Relaxed)
            + 1;

        if inserted {
            let distinct = self.counters.len();
            if distinct % SNAPSHOT_EVERY_DISTINCT == 0 {
                self.log_snapshot();
            }
            RecordOutcome::NewSignature { distinct }
        } else {
            RecordOutcome::Incremented { hits }
        }
    }

    #[must_use]
    pub fn hits(&self, signature: &str) -> u64 {
        self.counters.get(signature).map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Number of distinct signatures recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// All entries, hits descending, ties by signature ascending.
    #[must_use]
    pub fn entries_sorted(&self) -> Vec<HotspotEntry> {
        let mut entries: Vec<HotspotEntry> = self
            .counters
            .iter()
            .map(|e| HotspotEntry { signature: e.key().clone(), hits: e.value().load(Ordering::Relaxed) })
            .collect();
        entries.sort_unstable_by(|a, b| b.hits.cmp(&a.hits).then_with(|| a.signature.cmp(&b.signature)));
        entries
    }

    #[must_use]
    pub fn top(&self, n: usize) -> Vec<HotspotEntry> {
        let mut entries = self.entries_sorted();
        entries.truncate(n);
        entries
    }

    /// The full report as `method,hits` CSV.
    #[must_use]
    pub fn report_csv(&self) -> String {
        crate::export::hotspot_csv::render(&self.entries_sorted())
    }

    pub fn log_snapshot(&self) {
        let top = self.top(SNAPSHOT_TOP_N);
        let lines: Vec<String> = top.iter().map(|e| format!("  {} - {} hits", e.signature, e.hits)).collect();
        info!("Hotspot snapshot ({} signatures):\n{}", self.len(), lines.join("\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record_n(table: &HotspotTable, signature: &str, n: usize) {
        for _ in 0..n {
            table.record(signature);
        }
    }

    #[test]
    fn test_entries_sorted_by_hits_descending() {
        let table = HotspotTable::new();
        record_n(&table, "A", 5);
        record_n(&table, "B", 9);
        record_n(&table, "C", 1);

        let names: Vec<String> = table.entries_sorted().into_iter().map(|e| e.signature).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
        assert_eq!(table.hits("B"), 9);
        assert_eq!(table.hits("missing"), 0);
    }

    #[test]
    fn test_ties_break_by_signature() {
        let table = HotspotTable::new();
        record_n(&table, "z.Z.run()", 2);
        record_n(&table, "a.A.run()", 2);
        assert_eq!(table.top(1)[0].signature, "a.A.run()");
    }

    #[test]
    fn test_record_reports_new_signatures() {
        let table = HotspotTable::new();
        assert_eq!(table.record("a"), RecordOutcome::NewSignature { distinct: 1 });
        assert_eq!(table.record("a"), RecordOutcome::Incremented { hits: 2 });
        assert_eq!(table.record("b"), RecordOutcome::NewSignature { distinct: 2 });
    }

    #[test]
    fn test_concurrent_records_are_counted() {
        let table = Arc::new(HotspotTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || record_n(&table, "hot", 1000))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(table.hits("hot"), 8000);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_report_csv() {
        let table = HotspotTable::new();
        record_n(&table, "A", 5);
        record_n(&table, "B", 9);
        assert_eq!(table.report_csv(), "method,hits\nB,9\nA,5\n");
    }
}
