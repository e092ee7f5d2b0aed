//! In-process interception host.
//!
//! Application code that routes calls through [`DispatchTable::invoke`] gets
//! every installed rule woven around the call without any code rewriting.
//! Matching is done once per call-site shape and cached.

use dashmap::DashMap;
use log::debug;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use super::{CallSite, Disposition, InstrumentationPass, InterceptionHost, Rule};
use crate::domain::{HostError, InvocationError, MethodKind, Value};

/// Everything a matcher reads from a call site. Two sites with the same
/// signature but a different kind or interface list match different rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SiteKey {
    signature: String,
    kind: MethodKind,
    implements: Vec<String>,
}

impl SiteKey {
    fn of(site: &CallSite) -> Self {
        Self { signature: site.signature.clone(), kind: site.kind, implements: site.implements.clone() }
    }
}

#[derive(Debug, Default)]
pub struct DispatchTable {
    rules: RwLock<Vec<Rule>>,
    /// Matched rules per call-site shape.
    matched: DashMap<SiteKey, Arc<[Rule]>>,
}

impl DispatchTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules that apply to `site`, in installation order.
    pub fn rules_for(&self, site: &CallSite) -> Arc<[Rule]> {
        let key = SiteKey::of(site);
        if let Some(rules) = self.matched.get(&key) {
            return Arc::clone(rules.value());
        }
        // Held across the insert so an install cannot clear the cache between
        // matching and caching.
        let installed = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        let rules: Arc<[Rule]> = installed.iter().filter(|rule| rule.matcher.matches(site)).cloned().collect();
        self.matched.insert(key, Arc::clone(&rules));
        rules
    }

    /// Call `original` with every matching rule woven around it.
    ///
    /// # Errors
    /// Returns the original body's error, a rule's replacement error, or
    /// whatever an exit hook rewrote the result to.
    pub fn invoke<F>(&self, site: &CallSite, mut args: Vec<Value>, original: F) -> Result<Value, InvocationError>
    where
        F: FnOnce(&[Value]) -> Result<Value, InvocationError>,
    {
        let rules = self.rules_for(site);
        if rules.is_empty() {
            return original(&args);
        }

        let entered = Instant::now();
        let mut replaced = None;
        let mut ran = 0;
        for rule in rules.iter() {
            ran += 1;
            if let Disposition::Return(result) = rule.advice.on_enter(site, &mut args) {
                debug!("Rule {} answered {}", rule.name, site.signature);
                replaced = Some(result);
                break;
            }
        }

        let mut result = match replaced {
            Some(result) => result,
            None => original(&args),
        };
        for rule in rules[..ran].iter().rev() {
            rule.advice.on_exit(site, entered, &mut result);
        }
        result
    }

    /// Number of installed rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InterceptionHost for DispatchTable {
    fn install_pass(&self, pass: InstrumentationPass) -> Result<(), HostError> {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        rules.extend(pass.rules);
        self.matched.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::{Advice, RuleKind, SiteMatcher};
    use std::sync::Mutex;

    struct Trace {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        answer: Option<Value>,
    }

    impl Advice for Trace {
        fn on_enter(&self, _site: &CallSite, _args: &mut [Value]) -> Disposition {
            self.log.lock().unwrap().push(format!("enter {}", self.label));
            match &self.answer {
                Some(value) => Disposition::Return(Ok(value.clone())),
                None => Disposition::Proceed,
            }
        }

        fn on_exit(&self, _site: &CallSite, _entered: Instant, _result: &mut Result<Value, InvocationError>) {
            self.log.lock().unwrap().push(format!("exit {}", self.label));
        }
    }

    fn method(type_name: &str, method_name: &str) -> SiteMatcher {
        SiteMatcher::Method { type_name: type_name.to_string(), method_name: method_name.to_string() }
    }

    fn install(table: &DispatchTable, label: &'static str, log: &Arc<Mutex<Vec<String>>>, answer: Option<Value>) {
        let mut pass = InstrumentationPass::new();
        pass.push(Rule::new(
            label,
            RuleKind::Profiling,
            method("a.A", "run"),
            Arc::new(Trace { label, log: Arc::clone(log), answer }),
        ));
        table.install_pass(pass).unwrap();
    }

    #[test]
    fn test_unmatched_site_runs_original() {
        let table = DispatchTable::new();
        let site = CallSite::new("a.A", "other");
        assert_eq!(table.invoke(&site, vec![], |_| Ok(Value::Int(1))), Ok(Value::Int(1)));
    }

    #[test]
    fn test_hooks_wrap_original_in_order() {
        let table = DispatchTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        install(&table, "outer", &log, None);
        install(&table, "inner", &log, None);

        let site = CallSite::new("a.A", "run");
        let result = table.invoke(&site, vec![], |_| {
            log.lock().unwrap().push("body".to_string());
            Ok(Value::Unit)
        });

        assert_eq!(result, Ok(Value::Unit));
        assert_eq!(*log.lock().unwrap(), vec!["enter outer", "enter inner", "body", "exit inner", "exit outer"]);
    }

    #[test]
    fn test_return_skips_body_and_later_rules() {
        let table = DispatchTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        install(&table, "shim", &log, Some(Value::Int(42)));
        install(&table, "late", &log, None);

        let site = CallSite::new("a.A", "run");
        let result = table.invoke(&site, vec![], |_| panic!("original body must not run"));

        assert_eq!(result, Ok(Value::Int(42)));
        assert_eq!(*log.lock().unwrap(), vec!["enter shim", "exit shim"]);
    }

    #[test]
    fn test_install_invalidates_cache() {
        let table = DispatchTable::new();
        let site = CallSite::new("a.A", "run");
        assert!(table.rules_for(&site).is_empty());

        install(&table, "late", &Arc::new(Mutex::new(Vec::new())), None);
        assert_eq!(table.rules_for(&site).len(), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_cache_tells_apart_sites_with_same_signature() {
        let table = DispatchTable::new();
        let mut pass = InstrumentationPass::new();
        pass.push(Rule::new(
            "sql",
            RuleKind::Sanitization,
            SiteMatcher::SqlExecution,
            Arc::new(Trace { label: "sql", log: Arc::new(Mutex::new(Vec::new())), answer: None }),
        ));
        table.install_pass(pass).unwrap();

        let bare = CallSite::new("db.Stmt", "executeQuery").with_params([crate::domain::ParamKind::Str]);
        let statement = bare.clone().implementing(crate::interception::SQL_STATEMENT);
        assert_eq!(bare.signature, statement.signature);

        assert!(table.rules_for(&bare).is_empty());
        assert_eq!(table.rules_for(&statement).len(), 1);
        assert!(table.rules_for(&bare.clone().with_kind(MethodKind::Static)).is_empty());
    }
}
