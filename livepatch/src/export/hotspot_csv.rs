//! Hotspot report as CSV.
//!
//! ```text
//! method,hits
//! com.example.Billing.charge(int),42
//! "com.example.Report.render(int,String)",7
//! ```
//!
//! Fields containing `,` or `"` are quoted, with `"` doubled.

use anyhow::{Context, Result};
use livepatch_common::{HOTSPOT_CSV_HEADER, HOTSPOT_REPORT_FILE_NAME};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::analysis::{HotspotEntry, HotspotTable};

/// Render entries, header first, one line per entry.
#[must_use]
pub fn render(entries: &[HotspotEntry]) -> String {
    let mut out = String::with_capacity(HOTSPOT_CSV_HEADER.len() + 1 + entries.len() * 48);
    out.push_str(HOTSPOT_CSV_HEADER);
    out.push('\n');
    for entry in entries {
        out.push_str(&escape_field(&entry.signature));
        out.push(',');
        out.push_str(&entry.hits.to_string());
        out.push('\n');
    }
    out
}

/// Write the report for `entries` to `writer`.
///
/// # Errors
/// Returns an error if the writer fails.
pub fn write_report<W: Write>(entries: &[HotspotEntry], mut writer: W) -> std::io::Result<()> {
    writer.write_all(render(entries).as_bytes())?;
    writer.flush()
}

/// Save the table to `<dir>/hotspots.csv`, creating `dir` if needed.
///
/// # Errors
/// Returns an error if the directory or file cannot be written.
pub fn save_report(table: &HotspotTable, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory {}", dir.display()))?;
    let path = dir.join(HOTSPOT_REPORT_FILE_NAME);
    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_report(&table.entries_sorted(), BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
