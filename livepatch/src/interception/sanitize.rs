//! Sanitization rule and the live security pattern set.
//!
//! The compiled patterns sit behind one [`ArcSwap`]: every intercepted call
//! loads the current set, and an update swaps in a whole new set. A call that
//! already loaded the old set finishes with it; later calls see the new one.

use arc_swap::ArcSwap;
use livepatch_common::SecurityPatternFile;
use log::{info, warn};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use super::{Advice, CallSite, Disposition, Rule, RuleKind, SiteMatcher, HTTP_REQUEST, SQL_STATEMENT};
use crate::config::default_security_patterns;
use crate::config::loader::{SQL_INJECTION, XSS};
use crate::domain::{ConfigError, InvocationError, ParamKind, Value};

const SQL_EXECUTION_METHODS: &[&str] = &["executeQuery", "executeUpdate"];
const REQUEST_PARAMETER_METHODS: &[&str] = &["getParameter", "getParameterValues"];

/// Patterns every set must contain.
const REQUIRED_PATTERNS: &[&str] = &[SQL_INJECTION, XSS];

// =============================================================================
// PATTERN SET
// =============================================================================

/// Immutable snapshot of compiled patterns, by name.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: BTreeMap<String, Regex>,
}

impl PatternSet {
    /// Compile `raw`. Patterns that fail to compile are skipped with a
    /// warning; required patterns left missing are filled from the defaults.
    #[must_use]
    pub fn compile(raw: &SecurityPatternFile) -> Self {
        let mut patterns = BTreeMap::new();
        for (name, source) in raw {
            match compile_pattern(name, source) {
                Ok(regex) => {
                    patterns.insert(name.clone(), regex);
                }
                Err(e) => warn!("Skipping security pattern: {e}"),
            }
        }

        let defaults = default_security_patterns();
        for name in REQUIRED_PATTERNS {
            if patterns.contains_key(*name) {
                continue;
            }
            if let Some(regex) = defaults.get(*name).and_then(|s| compile_pattern(name, s).ok()) {
                info!("Security pattern {name} not configured, using default");
                patterns.insert((*name).to_string(), regex);
            }
        }
        Self { patterns }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Regex> {
        self.patterns.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn compile_pattern(name: &str, source: &str) -> Result<Regex, ConfigError> {
    Regex::new(source).map_err(|source| ConfigError::InvalidPattern { name: name.to_string(), source })
}

// =============================================================================
// LIVE PATTERNS
// =============================================================================

/// The process-wide, atomically replaceable pattern set.
#[derive(Debug)]
pub struct SecurityPatterns {
    current: ArcSwap<PatternSet>,
}

impl SecurityPatterns {
    #[must_use]
    pub fn new(raw: &SecurityPatternFile) -> Self {
        Self { current: ArcSwap::from_pointee(PatternSet::compile(raw)) }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(&default_security_patterns())
    }

    /// The set as of now.
    #[must_use]
    pub fn load(&self) -> Arc<PatternSet> {
        self.current.load_full()
    }

    /// Add or replace one pattern.
    ///
    /// # Errors
    /// Returns an error if `source` does not compile; the live set is unchanged.
    pub fn set_pattern(&self, name: &str, source: &str) -> Result<(), ConfigError> {
        let regex = compile_pattern(name, source)?;
        self.current.rcu(|current| {
            let mut next = PatternSet::clone(current);
            next.patterns.insert(name.to_string(), regex.clone());
            next
        });
        info!("Updated security pattern {name}");
        Ok(())
    }

    /// # Errors
    /// Returns an error if `source` does not compile.
    pub fn set_sql_injection_pattern(&self, source: &str) -> Result<(), ConfigError> {
        self.set_pattern(SQL_INJECTION, source)
    }

    /// # Errors
    /// Returns an error if `source` does not compile.
    pub fn set_xss_pattern(&self, source: &str) -> Result<(), ConfigError> {
        self.set_pattern(XSS, source)
    }

    /// Swap in a freshly compiled set.
    pub fn replace_all(&self, raw: &SecurityPatternFile) {
        let next = PatternSet::compile(raw);
        info!("Replaced security patterns ({} loaded)", next.len());
        self.current.store(Arc::new(next));
    }

    /// True if the named pattern exists and matches `input`.
    #[must_use]
    pub fn is_match(&self, name: &str, input: &str) -> bool {
        self.current.load().get(name).is_some_and(|re| re.is_match(input))
    }
}

// =============================================================================
// SANITIZERS
// =============================================================================

/// Remove every match of `pattern`, repeating until nothing changes.
///
/// Removing one match can join its neighbours into a new match; iterating to
/// a fixed point makes the result stable under a second application.
#[must_use]
pub fn sanitize_sql(pattern: &Regex, input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = pattern.replace_all(&current, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Escape `& < > " ' / \`` to their HTML entities.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 4);
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '/' => out.push_str("&#x2F;"),
            '`' => out.push_str("&#x60;"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// MATCHERS AND ADVICE
// =============================================================================

#[must_use]
pub fn is_sql_execution(site: &CallSite) -> bool {
    SQL_EXECUTION_METHODS.contains(&site.method_name.as_str())
        && site.params == [ParamKind::Str]
        && site.implements(SQL_STATEMENT)
}

#[must_use]
pub fn is_request_parameter(site: &CallSite) -> bool {
    REQUEST_PARAMETER_METHODS.contains(&site.method_name.as_str()) && site.implements(HTTP_REQUEST)
}

/// Strips injection fragments from the SQL text before it executes.
#[derive(Debug)]
pub struct SqlSanitizeAdvice {
    patterns: Arc<SecurityPatterns>,
}

impl SqlSanitizeAdvice {
    pub fn new(patterns: Arc<SecurityPatterns>) -> Self {
        Self { patterns }
    }
}

impl Advice for SqlSanitizeAdvice {
    fn on_enter(&self, site: &CallSite, args: &mut [Value]) -> Disposition {
        let set = self.patterns.load();
        if let (Some(Value::Str(sql)), Some(pattern)) = (args.first_mut(), set.get(SQL_INJECTION)) {
            if pattern.is_match(sql) {
                warn!("Potential SQL injection blocked in {}", site.signature);
                *sql = sanitize_sql(pattern, sql);
            }
        }
        Disposition::Proceed
    }
}

/// Escapes request parameter values that look like script injection.
#[derive(Debug)]
pub struct ParameterSanitizeAdvice {
    patterns: Arc<SecurityPatterns>,
}

impl ParameterSanitizeAdvice {
    pub fn new(patterns: Arc<SecurityPatterns>) -> Self {
        Self { patterns }
    }
}

impl Advice for ParameterSanitizeAdvice {
    fn on_exit(&self, site: &CallSite, _entered: Instant, result: &mut Result<Value, InvocationError>) {
        let set = self.patterns.load();
        let Some(pattern) = set.get(XSS) else {
            return;
        };
        let escape = |value: &mut String| {
            if pattern.is_match(value) {
                warn!("Potential XSS blocked in {}", site.signature);
                *value = escape_html(value);
            }
        };
        match result {
            Ok(Value::Str(value)) => escape(value),
            Ok(Value::StrList(values)) => values.iter_mut().flatten().for_each(escape),
            _ => {}
        }
    }
}

/// The SQL and request-parameter rules.
#[must_use]
pub fn sanitization_rules(patterns: &Arc<SecurityPatterns>) -> Vec<Rule> {
    vec![
        Rule::new(
            "sanitize[sql]",
            RuleKind::Sanitization,
            SiteMatcher::SqlExecution,
            Arc::new(SqlSanitizeAdvice::new(Arc::clone(patterns))),
        ),
        Rule::new(
            "sanitize[request-parameter]",
            RuleKind::Sanitization,
            SiteMatcher::RequestParameter,
            Arc::new(ParameterSanitizeAdvice::new(Arc::clone(patterns))),
        ),
    ]
}
