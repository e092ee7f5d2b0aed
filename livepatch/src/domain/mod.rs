//! Domain model for livepatch
//!
//! This module contains core domain types and errors that provide:
//! - Dynamic call values passed through interception rules
//! - Method descriptors used by matchers
//! - Structured error handling per failure class

pub mod errors;
pub mod types;

pub use types::{MethodKind, ParamKind, Value};

pub use errors::{
    ApplyError, ConfigError, HostError, InstallError, InvocationError, MappingError, SourceError,
};
