//! Plugin-directory host.
//!
//! Each loadable unit is a file below a root directory. The class name maps to
//! a relative path by turning `.` separators into directories and appending
//! the unit extension: `com.example.Billing` → `com/example/Billing.bin`.

use log::debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{CodeReplacer, LoadedUnit, UnitResolver};
use crate::domain::HostError;

/// Extension used when none is configured.
pub const DEFAULT_UNIT_EXTENSION: &str = "bin";

/// Resolves units that exist as files under `root`.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    name: String,
    root: PathBuf,
    extension: String,
}

impl DirectoryResolver {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), root: root.into(), extension: DEFAULT_UNIT_EXTENSION.to_string() }
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Path a unit would live at, whether or not it exists.
    #[must_use]
    pub fn unit_path(&self, class_name: &str) -> Option<PathBuf> {
        let invalid = |part: &str| part.is_empty() || part.contains(['/', '\\']);
        if class_name.split('.').any(invalid) {
            return None;
        }
        let mut path = self.root.clone();
        for part in class_name.split('.') {
            path.push(part);
        }
        path.set_extension(&self.extension);
        Some(path)
    }
}

impl UnitResolver for DirectoryResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, class_name: &str) -> Option<LoadedUnit> {
        let path = self.unit_path(class_name)?;
        path.is_file().then(|| LoadedUnit {
            class_name: class_name.to_string(),
            location: path,
            resolved_by: self.name.clone(),
        })
    }
}

/// Replaces unit files atomically: the new body is written to a sibling temp
/// file, synced, then renamed over the unit.
#[derive(Debug, Clone, Default)]
pub struct DirectoryReplacer;

impl DirectoryReplacer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CodeReplacer for DirectoryReplacer {
    fn replace_unit(&self, unit: &LoadedUnit, body: &[u8]) -> Result<(), HostError> {
        if body.is_empty() {
            return Err(HostError::Rejected {
                unit: unit.class_name.clone(),
                reason: "empty body".to_string(),
            });
        }
        let target = &unit.location;
        let tmp = temp_sibling(target);

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(body)?;
            file.sync_all()?;
            fs::rename(&tmp, target)
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(HostError::Io(e));
        }
        debug!("Replaced {} ({} bytes) at {}", unit.class_name, body.len(), target.display());
        Ok(())
    }
}

fn temp_sibling(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".livepatch.tmp");
    target.with_file_name(name)
}
