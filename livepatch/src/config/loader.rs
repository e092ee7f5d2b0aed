//! Loading of the JSON rule configuration.
//!
//! Both loaders are total: a missing or malformed file is logged and the
//! built-in defaults are returned, so a broken config never blocks install.

use livepatch_common::{DeprecationFile, SecurityPatternFile};
use log::{info, warn};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::ConfigError;

/// Name of the SQL injection pattern.
pub const SQL_INJECTION: &str = "SQL_INJECTION";

/// Name of the cross-site scripting pattern.
pub const XSS: &str = "XSS";

const DEFAULT_SQL_INJECTION_PATTERN: &str = concat!(
    r"(?i)('\s*or\s*'\s*=\s*')|('\s*or\s*1\s*=\s*1)|(;\s*drop\s+table)|(;\s*delete\s+from)",
    r"|(--\s*$)|(\bUNION\b.*\bSELECT\b)|(\bSELECT\b.*\bFROM\b.*information_schema)",
);

const DEFAULT_XSS_PATTERN: &str = concat!(
    "<script>|</script>|javascript:|onerror=|onclick=|onload=|onmouseover=|onfocus=",
    "|onblur=|onkeydown=|onsubmit=|ondblclick=|data:text/html",
);

/// Deprecated `(class, method)` pairs and the raw `Class#method` target each
/// one should be redirected to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeprecationMappings(DeprecationFile);

impl DeprecationMappings {
    #[must_use]
    pub fn new(file: DeprecationFile) -> Self {
        Self(file)
    }

    /// Iterate `(source_class, source_method, target)` triples in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.0.iter().flat_map(|(class, methods)| {
            methods
                .iter()
                .map(move |(method, target)| (class.as_str(), method.as_str(), target.as_str()))
        })
    }

    #[must_use]
    pub fn target(&self, class: &str, method: &str) -> Option<&str> {
        self.0.get(class)?.get(method).map(String::as_str)
    }

    /// Number of method mappings across all classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The three built-in redirections.
#[must_use]
pub fn default_deprecation_mappings() -> DeprecationMappings {
    let mut file = DeprecationFile::new();
    let mut add = |class: &str, method: &str, target: &str| {
        file.entry(class.to_string()).or_default().insert(method.to_string(), target.to_string());
    };
    add("legacy.MathUtil", "sum", "math#checked_add");
    add("legacy.FileUtils", "deleteFile", "fs#remove_if_exists");
    add("legacy.WebUtils", "encodeUrl", "url#encode");
    DeprecationMappings(file)
}

/// The two built-in sanitization patterns.
#[must_use]
pub fn default_security_patterns() -> SecurityPatternFile {
    BTreeMap::from([
        (SQL_INJECTION.to_string(), DEFAULT_SQL_INJECTION_PATTERN.to_string()),
        (XSS.to_string(), DEFAULT_XSS_PATTERN.to_string()),
    ])
}

/// Load deprecation mappings, falling back to the defaults.
#[must_use]
pub fn load_deprecation_mappings(path: &Path) -> DeprecationMappings {
    match read_json::<DeprecationFile>(path) {
        Ok(Some(file)) => {
            let mappings = DeprecationMappings(file);
            info!("Loaded {} deprecation mappings from {}", mappings.len(), path.display());
            mappings
        }
        Ok(None) => {
            info!("Deprecation mappings file not found at {}, using defaults", path.display());
            default_deprecation_mappings()
        }
        Err(e) => {
            warn!("Failed to load deprecation mappings: {e}; using defaults");
            default_deprecation_mappings()
        }
    }
}

/// Load raw security patterns, falling back to the defaults.
///
/// Compilation happens later in [`crate::interception::sanitize::PatternSet`],
/// which also fills in any required pattern the file leaves out.
#[must_use]
pub fn load_security_patterns(path: &Path) -> SecurityPatternFile {
    match read_json::<SecurityPatternFile>(path) {
        Ok(Some(patterns)) => {
            info!("Loaded {} security patterns from {}", patterns.len(), path.display());
            patterns
        }
        Ok(None) => {
            info!("Security patterns file not found at {}, using defaults", path.display());
            default_security_patterns()
        }
        Err(e) => {
            warn!("Failed to load security patterns: {e}; using defaults");
            default_security_patterns()
        }
    }
}

/// Read and decode a JSON file. A missing file is `Ok(None)`.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(ConfigError::Io { path: path.to_path_buf(), source }),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigError::Json { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_patterns_file_yields_exactly_the_defaults() {
        let patterns = load_security_patterns(Path::new("/nonexistent/security-patterns.json"));
        let names: Vec<&str> = patterns.keys().map(String::as_str).collect();
        assert_eq!(names, vec![SQL_INJECTION, XSS]);
    }

    #[test]
    fn test_malformed_patterns_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("security-patterns.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(load_security_patterns(&path), default_security_patterns());
    }

    #[test]
    fn test_patterns_file_is_loaded_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("security-patterns.json");
        std::fs::write(&path, r#"{ "TEST_PATTERN": "test[0-9]+" }"#).unwrap();

        let patterns = load_security_patterns(&path);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns["TEST_PATTERN"], "test[0-9]+");
    }

    #[test]
    fn test_missing_mappings_file_yields_three_defaults() {
        let mappings = load_deprecation_mappings(Path::new("/nonexistent/deprecation.json"));
        assert_eq!(mappings.len(), 3);
        assert_eq!(mappings.target("legacy.MathUtil", "sum"), Some("math#checked_add"));
    }

    #[test]
    fn test_mappings_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deprecation-mappings.json");
        std::fs::write(&path, r#"{ "test.OldClass": { "oldMethod": "test.NewClass#newMethod" } }"#)
            .unwrap();

        let mappings = load_deprecation_mappings(&path);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings.target("test.OldClass", "oldMethod"), Some("test.NewClass#newMethod"));
        assert_eq!(
            mappings.iter().collect::<Vec<_>>(),
            vec![("test.OldClass", "oldMethod", "test.NewClass#newMethod")]
        );
    }

    #[test]
    fn test_default_patterns_compile() {
        for (name, source) in default_security_patterns() {
            assert!(regex::Regex::new(&source).is_ok(), "{name} should compile");
        }
    }
}
