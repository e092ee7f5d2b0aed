//! # Shared Wire Formats (Publisher ↔ Agent)
//!
//! Defines the documents exchanged between whatever publishes live patches and
//! the `livepatch` agent that consumes them. Anything that writes a manifest
//! or a config file should depend on this crate instead of re-declaring the
//! shapes.
//!
//! ## Documents
//!
//! - [`PatchManifest`] - `manifest.json`, the versioned list of replacements
//! - [`PatchEntry`] - one class name + body locator inside a manifest
//! - [`DeprecationFile`] - `deprecation-mappings.json`
//! - [`SecurityPatternFile`] - `security-patterns.json`
//!
//! ## Example manifest
//!
//! ```json
//! {
//!   "version": "1.0.3",
//!   "timestamp": 1715767200000,
//!   "patches": [
//!     { "className": "com.example.dao.UserDao", "path": "com/example/dao/UserDao.bin" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// File Names and Headers
// ============================================================================

/// Name of the manifest document, relative to the patch endpoint.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Default file name of the deprecation mappings config.
pub const DEPRECATION_FILE_NAME: &str = "deprecation-mappings.json";

/// Default file name of the security patterns config.
pub const SECURITY_PATTERNS_FILE_NAME: &str = "security-patterns.json";

/// File name of the hotspot report written at shutdown.
pub const HOTSPOT_REPORT_FILE_NAME: &str = "hotspots.csv";

/// Header line of the hotspot report (the only supported schema).
pub const HOTSPOT_CSV_HEADER: &str = "method,hits";

/// Separator between target class and target method in a deprecation mapping.
pub const MAPPING_TARGET_SEPARATOR: char = '#';

// ============================================================================
// Manifest
// ============================================================================

/// A deployable unit of live patches.
///
/// Produced by an external release process and immutable once fetched. The
/// agent applies a given `version` at most once per `timestamp`: re-delivery
/// with a strictly newer timestamp counts as an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchManifest {
    pub version: String,

    /// Publication time in milliseconds since the Unix epoch.
    pub timestamp: i64,

    /// Replacements, applied in this order.
    #[serde(default)]
    pub patches: Vec<PatchEntry>,
}

/// One class replacement inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchEntry {
    /// Fully qualified name of the loaded unit to replace.
    #[serde(rename = "className")]
    pub class_name: String,

    /// Manifest-relative locator of the replacement body.
    ///
    /// Over HTTP this resolves to `<endpoint>/<version>/<path>`, on a
    /// filesystem endpoint to `<endpoint>/<path>`.
    pub path: String,
}

impl PatchManifest {
    /// Returns true if the manifest carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

impl PatchEntry {
    pub fn new(class_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self { class_name: class_name.into(), path: path.into() }
    }
}

// ============================================================================
// Config Files
// ============================================================================

/// `deprecation-mappings.json`: source class → source method → `"Class#method"`.
pub type DeprecationFile = BTreeMap<String, BTreeMap<String, String>>;

/// `security-patterns.json`: pattern name → regular expression source.
pub type SecurityPatternFile = BTreeMap<String, String>;
