//! Filesystem patch transport.

use livepatch_common::{PatchManifest, MANIFEST_FILE_NAME};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use super::Fetched;
use crate::domain::SourceError;

/// Reads manifests and bodies from a directory tree.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read `<root>/manifest.json`.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn fetch_manifest(&self) -> Result<Fetched<PatchManifest>, SourceError> {
        let path = self.root.join(MANIFEST_FILE_NAME);
        let Fetched::Found(bytes) = read_optional(&path)? else {
            return Ok(Fetched::NotFound);
        };
        serde_json::from_slice(&bytes)
            .map(Fetched::Found)
            .map_err(|source| SourceError::Malformed { origin: path.display().to_string(), source })
    }

    /// Read `<root>/<path>`.
    ///
    /// The caller is expected to have checked `path` with [`is_contained`].
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read.
    pub fn fetch_body(&self, path: &str) -> Result<Fetched<Vec<u8>>, SourceError> {
        read_optional(&self.root.join(path))
    }
}

/// True if a manifest-relative path stays below the endpoint root.
#[must_use]
pub fn is_contained(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn read_optional(path: &Path) -> Result<Fetched<Vec<u8>>, SourceError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Fetched::Found(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Fetched::NotFound),
        Err(source) => Err(SourceError::Io { path: path.to_path_buf(), source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_manifest_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsSource::new(dir.path());
        assert_eq!(source.fetch_manifest().unwrap(), Fetched::NotFound);
    }

    #[test]
    fn test_reads_manifest_and_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"version":"1","timestamp":5,"patches":[{"className":"a.B","path":"a/B.bin"}]}"#,
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("a/B.bin"), b"body").unwrap();

        let source = FsSource::new(dir.path());
        let manifest = source.fetch_manifest().unwrap().found().unwrap();
        assert_eq!(manifest.patches[0].class_name, "a.B");
        assert_eq!(source.fetch_body("a/B.bin").unwrap(), Fetched::Found(b"body".to_vec()));
        assert_eq!(source.fetch_body("a/C.bin").unwrap(), Fetched::NotFound);
    }

    #[test]
    fn test_malformed_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("manifest.json"), "[1, 2").unwrap();

        let err = FsSource::new(dir.path()).fetch_manifest().unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
    }

    #[test]
    fn test_is_contained() {
        assert!(is_contained("com/example/A.bin"));
        assert!(is_contained("./A.bin"));
        assert!(!is_contained("../secrets"));
        assert!(!is_contained("a/../../b"));
        assert!(!is_contained("/etc/passwd"));
        assert!(!is_contained(""));
    }
}
