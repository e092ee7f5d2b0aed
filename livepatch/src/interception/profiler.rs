//! Profiling rule: time calls under configured packages and count the slow
//! ones in the hotspot table.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Advice, CallSite, Rule, RuleKind, SiteMatcher};
use crate::analysis::HotspotTable;
use crate::domain::{InvocationError, MethodKind, Value};

/// Method-name prefixes of accessors, which are never profiled.
const ACCESSOR_PREFIXES: &[&str] = &["get", "set"];

/// Object-identity methods, never profiled.
const IDENTITY_METHODS: &[&str] = &["toString", "equals", "hashCode"];

/// Entry-point method-name prefix.
const ENTRY_POINT_PREFIX: &str = "main";

/// True if the site sits under one of `prefixes` and is not trivial.
#[must_use]
pub fn is_profiled(prefixes: &[String], site: &CallSite) -> bool {
    if !prefixes.iter().any(|p| site.type_name.starts_with(p.as_str())) {
        return false;
    }
    let name = site.method_name.as_str();
    match site.kind {
        MethodKind::Constructor => return false,
        MethodKind::Static if name.starts_with(ENTRY_POINT_PREFIX) => return false,
        _ => {}
    }
    !ACCESSOR_PREFIXES.iter().any(|p| name.starts_with(p))
        && !IDENTITY_METHODS.iter().any(|m| name.contains(m))
}

/// Records calls slower than the threshold.
#[derive(Debug)]
pub struct ProfilerAdvice {
    hotspots: Arc<HotspotTable>,
    threshold: Duration,
}

impl ProfilerAdvice {
    pub fn new(hotspots: Arc<HotspotTable>, threshold: Duration) -> Self {
        Self { hotspots, threshold }
    }
}

impl Advice for ProfilerAdvice {
    fn on_exit(&self, site: &CallSite, entered: Instant, _result: &mut Result<Value, InvocationError>) {
        if entered.elapsed() > self.threshold {
            self.hotspots.record(&site.signature);
        }
    }
}

/// The profiling rule for `packages`.
#[must_use]
pub fn profiling_rule(packages: &[String], hotspots: Arc<HotspotTable>, threshold: Duration) -> Rule {
    Rule::new(
        format!("profiler[{}]", packages.join(",")),
        RuleKind::Profiling,
        SiteMatcher::PackagePrefixes(packages.to_vec()),
        Arc::new(ProfilerAdvice::new(hotspots, threshold)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes() -> Vec<String> {
        vec!["com.example".to_string()]
    }

    #[test]
    fn test_matches_ordinary_methods_under_prefix() {
        assert!(is_profiled(&prefixes(), &CallSite::new("com.example.Billing", "charge")));
        assert!(!is_profiled(&prefixes(), &CallSite::new("org.other.Billing", "charge")));
    }

    #[test]
    fn test_excludes_trivial_methods() {
        let p = prefixes();
        for method in ["getName", "setName", "toString", "equals", "hashCode"] {
            assert!(!is_profiled(&p, &CallSite::new("com.example.A", method)), "{method}");
        }
        assert!(!is_profiled(&p, &CallSite::new("com.example.A", "<init>").with_kind(MethodKind::Constructor)));
        assert!(!is_profiled(&p, &CallSite::new("com.example.App", "main").with_kind(MethodKind::Static)));
        assert!(is_profiled(&p, &CallSite::new("com.example.App", "compute").with_kind(MethodKind::Static)));
    }

    #[test]
    fn test_only_slow_calls_are_recorded() {
        let table = Arc::new(HotspotTable::new());
        let advice = ProfilerAdvice::new(Arc::clone(&table), Duration::from_millis(50));
        let site = CallSite::new("com.example.A", "run");
        let mut result = Ok(Value::Unit);

        advice.on_exit(&site, Instant::now(), &mut result);
        assert_eq!(table.hits(&site.signature), 0);

        let long_ago = Instant::now().checked_sub(Duration::from_millis(80)).unwrap();
        advice.on_exit(&site, long_ago, &mut result);
        assert_eq!(table.hits(&site.signature), 1);
    }
}
