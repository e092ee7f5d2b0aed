//! Report export
//!
//! Currently supports the hotspot report as `method,hits` CSV.

pub mod hotspot_csv;

pub use hotspot_csv::{render, save_report, write_report};
