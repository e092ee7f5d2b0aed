//! Analysis of data collected by the interception rules.

pub mod hotspot_table;

pub use hotspot_table::{HotspotEntry, HotspotTable, RecordOutcome};
