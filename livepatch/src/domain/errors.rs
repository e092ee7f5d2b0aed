//! Structured error types for livepatch
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Expected absence (no manifest, no body) is not an error and is modelled by
//! [`crate::source::Fetched::NotFound`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to reach or read the patch endpoint. Always recoverable: the next
/// poll cycle retries.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest from {origin}: {source}")]
    Malformed {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Failure of a single manifest entry. Never aborts the batch.
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("Failed to fetch patch body for {class_name}: {source}")]
    Transport {
        class_name: String,
        #[source]
        source: SourceError,
    },

    #[error("Replacement of {class_name} rejected: {source}")]
    ReplaceRejected {
        class_name: String,
        #[source]
        source: HostError,
    },

    #[error("Patch path {path:?} for {class_name} escapes the endpoint root")]
    InvalidPath { class_name: String, path: String },
}

/// Errors reported by the host's live-replace or interception capability.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Unit {unit} rejected the new body: {reason}")]
    Rejected { unit: String, reason: String },

    #[error("Host does not support {0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to load a config file. Logged; built-in defaults are used instead.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Pattern {name} does not compile: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// A deprecation mapping entry that cannot be turned into a redirection.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MappingError {
    #[error("Invalid deprecation mapping format: {target:?} (expected Class#method)")]
    Malformed { target: String },

    #[error("Unsupported target method: {target}")]
    Unsupported { target: String },
}

/// Failure while installing the interception rules.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Interception host refused the instrumentation pass: {0}")]
    Host(#[from] HostError),
}

/// Error surfaced to the caller of an intercepted method.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("integer overflow: {lhs} + {rhs}")]
    Overflow { lhs: i64, rhs: i64 },

    #[error("argument {index}: expected {expected}, found {found}")]
    ArgumentMismatch { index: usize, expected: &'static str, found: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = SourceError::Status { url: "http://h/p/manifest.json".to_string(), status: 503 };
        assert_eq!(err.to_string(), "HTTP 503 from http://h/p/manifest.json");
    }

    #[test]
    fn test_replace_rejected_names_class() {
        let err = ApplyError::ReplaceRejected {
            class_name: "com.example.Billing".to_string(),
            source: HostError::Rejected {
                unit: "com.example.Billing".to_string(),
                reason: "schema changed".to_string(),
            },
        };
        assert!(err.to_string().contains("com.example.Billing"));
        assert!(err.to_string().contains("schema changed"));
    }

    #[test]
    fn test_mapping_error_display() {
        let err = MappingError::Unsupported { target: "x.Y#z".to_string() };
        assert_eq!(err.to_string(), "Unsupported target method: x.Y#z");
    }
}
