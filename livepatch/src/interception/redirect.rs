//! Redirection rule: answer calls to deprecated methods with a built-in shim
//! instead of running the deprecated body.
//!
//! Mapping targets are written `Class#method`. Each shim accepts its short
//! name and the name of the platform method it stands in for:
//!
//! | Shim | Targets |
//! |---|---|
//! | [`ShimTarget::CheckedAdd`] | `math#checked_add`, `java.lang.Math#addExact` |
//! | [`ShimTarget::RemoveIfExists`] | `fs#remove_if_exists`, `java.nio.file.Files#deleteIfExists` |
//! | [`ShimTarget::UrlEncode`] | `url#encode`, `java.net.URLEncoder#encode` |

use livepatch_common::MAPPING_TARGET_SEPARATOR;
use log::{debug, warn};
use std::fmt;
use std::io::ErrorKind;
use std::sync::Arc;

use super::{Advice, CallSite, Disposition, Rule, RuleKind, SiteMatcher};
use crate::config::DeprecationMappings;
use crate::domain::{InvocationError, MappingError, Value};

/// A supported replacement implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShimTarget {
    /// `(i64, i64) -> i64`, overflow is an invocation error.
    CheckedAdd,
    /// `(path) -> bool`, true if a file was removed.
    RemoveIfExists,
    /// `(text) -> text`, UTF-8 form encoding: space becomes `+`, only
    /// alphanumerics and `*-._` pass through.
    UrlEncode,
}

impl ShimTarget {
    /// Run the shim against the intercepted call's arguments.
    ///
    /// # Errors
    /// Returns an error on overflow or if the arguments have the wrong types.
    pub fn invoke(self, args: &[Value]) -> Result<Value, InvocationError> {
        match self {
            ShimTarget::CheckedAdd => {
                let (lhs, rhs) = (int_arg(args, 0)?, int_arg(args, 1)?);
                lhs.checked_add(rhs).map(Value::Int).ok_or(InvocationError::Overflow { lhs, rhs })
            }
            ShimTarget::RemoveIfExists => Ok(Value::Bool(remove_if_exists(str_arg(args, 0)?))),
            ShimTarget::UrlEncode => match args.first() {
                Some(Value::Null) => Ok(Value::Null),
                _ => Ok(Value::Str(form_urlencoded::byte_serialize(str_arg(args, 0)?.as_bytes()).collect())),
            },
        }
    }
}

impl fmt::Display for ShimTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShimTarget::CheckedAdd => f.write_str("checked_add"),
            ShimTarget::RemoveIfExists => f.write_str("remove_if_exists"),
            ShimTarget::UrlEncode => f.write_str("url_encode"),
        }
    }
}

/// Parse a `Class#method` mapping target into a supported shim.
///
/// # Errors
/// [`MappingError::Malformed`] if the target is not `Class#method`,
/// [`MappingError::Unsupported`] if no shim implements it.
pub fn parse_target(target: &str) -> Result<ShimTarget, MappingError> {
    let malformed = || MappingError::Malformed { target: target.to_string() };
    let (class, method) = target.split_once(MAPPING_TARGET_SEPARATOR).ok_or_else(malformed)?;
    if class.is_empty() || method.is_empty() || method.contains(MAPPING_TARGET_SEPARATOR) {
        return Err(malformed());
    }

    match (class, method) {
        ("math", "checked_add") | ("java.lang.Math", "addExact") => Ok(ShimTarget::CheckedAdd),
        ("fs", "remove_if_exists") | ("java.nio.file.Files", "deleteIfExists") => {
            Ok(ShimTarget::RemoveIfExists)
        }
        ("url", "encode") | ("java.net.URLEncoder", "encode") => Ok(ShimTarget::UrlEncode),
        _ => Err(MappingError::Unsupported { target: target.to_string() }),
    }
}

/// Answers the call with the shim result; the deprecated body never runs.
#[derive(Debug)]
pub struct RedirectAdvice {
    target: ShimTarget,
}

impl RedirectAdvice {
    #[must_use]
    pub fn new(target: ShimTarget) -> Self {
        Self { target }
    }
}

impl Advice for RedirectAdvice {
    fn on_enter(&self, site: &CallSite, args: &mut [Value]) -> Disposition {
        debug!("Redirecting {} to {}", site.signature, self.target);
        Disposition::Return(self.target.invoke(args))
    }
}

/// One redirection rule per usable mapping. Unusable mappings are skipped
/// with a warning.
#[must_use]
pub fn redirection_rules(mappings: &DeprecationMappings) -> Vec<Rule> {
    mappings
        .iter()
        .filter_map(|(class, method, target)| match parse_target(target) {
            Ok(shim) => Some(Rule::new(
                format!("redirect[{class}.{method} -> {shim}]"),
                RuleKind::Redirection,
                SiteMatcher::Method { type_name: class.to_string(), method_name: method.to_string() },
                Arc::new(RedirectAdvice::new(shim)),
            )),
            Err(e) => {
                warn!("Skipping deprecation mapping {class}.{method}: {e}");
                None
            }
        })
        .collect()
}

fn remove_if_exists(path: &str) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to delete {path}: {e}");
            false
        }
    }
}

fn int_arg(args: &[Value], index: usize) -> Result<i64, InvocationError> {
    let value = args.get(index);
    value.and_then(Value::as_int).ok_or_else(|| mismatch(index, "int", value))
}

fn str_arg(args: &[Value], index: usize) -> Result<&str, InvocationError> {
    let value = args.get(index);
    value.and_then(Value::as_str).ok_or_else(|| mismatch(index, "String", value))
}

fn mismatch(index: usize, expected: &'static str, found: Option<&Value>) -> InvocationError {
    InvocationError::ArgumentMismatch {
        index,
        expected,
        found: found.map_or("nothing", Value::type_name).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_deprecation_mappings;
    use livepatch_common::DeprecationFile;

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("math#checked_add"), Ok(ShimTarget::CheckedAdd));
        assert_eq!(parse_target("java.lang.Math#addExact"), Ok(ShimTarget::CheckedAdd));
        assert_eq!(parse_target("java.net.URLEncoder#encode"), Ok(ShimTarget::UrlEncode));
        assert!(matches!(parse_target("NoSeparator"), Err(MappingError::Malformed { .. })));
        assert!(matches!(parse_target("#method"), Err(MappingError::Malformed { .. })));
        assert!(matches!(parse_target("a#b#c"), Err(MappingError::Malformed { .. })));
        assert_eq!(
            parse_target("test.NewClass#newMethod"),
            Err(MappingError::Unsupported { target: "test.NewClass#newMethod".to_string() })
        );
    }

    #[test]
    fn test_checked_add() {
        let add = ShimTarget::CheckedAdd;
        assert_eq!(add.invoke(&[Value::Int(2), Value::Int(3)]), Ok(Value::Int(5)));
        assert_eq!(
            add.invoke(&[Value::Int(i64::MAX), Value::Int(1)]),
            Err(InvocationError::Overflow { lhs: i64::MAX, rhs: 1 })
        );
        assert!(matches!(
            add.invoke(&[Value::Int(1)]),
            Err(InvocationError::ArgumentMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.tmp");
        std::fs::write(&path, b"x").unwrap();
        let arg = [Value::from(path.display().to_string())];

        assert_eq!(ShimTarget::RemoveIfExists.invoke(&arg), Ok(Value::Bool(true)));
        assert_eq!(ShimTarget::RemoveIfExists.invoke(&arg), Ok(Value::Bool(false)));
        // A directory cannot be removed as a file: logged, reported as false.
        let dir_arg = [Value::from(dir.path().display().to_string())];
        assert_eq!(ShimTarget::RemoveIfExists.invoke(&dir_arg), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(
            ShimTarget::UrlEncode.invoke(&[Value::from("a b&c=d/é")]),
            Ok(Value::from("a+b%26c%3Dd%2F%C3%A9"))
        );
        assert_eq!(ShimTarget::UrlEncode.invoke(&[Value::from("a b*~-._")]), Ok(Value::from("a+b*%7E-._")));
        assert_eq!(ShimTarget::UrlEncode.invoke(&[Value::Null]), Ok(Value::Null));
    }

    #[test]
    fn test_defaults_yield_three_rules() {
        assert_eq!(redirection_rules(&default_deprecation_mappings()).len(), 3);
    }

    #[test]
    fn test_unsupported_mapping_is_skipped() {
        let mut file = DeprecationFile::new();
        file.entry("test.OldClass".to_string())
            .or_default()
            .insert("oldMethod".to_string(), "test.NewClass#newMethod".to_string());
        file.entry("legacy.MathUtil".to_string())
            .or_default()
            .insert("sum".to_string(), "math#checked_add".to_string());

        let rules = redirection_rules(&DeprecationMappings::new(file));
        assert_eq!(rules.len(), 1);
        assert_eq!(
            rules[0].matcher,
            SiteMatcher::Method { type_name: "legacy.MathUtil".to_string(), method_name: "sum".to_string() }
        );
    }
}
