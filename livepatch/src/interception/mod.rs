//! # Interception Rules
//!
//! Cross-cutting rules woven around matched call sites. Three families:
//!
//! | Family | Module | Hook | Effect |
//! |---|---|---|---|
//! | Profiling | [`profiler`] | exit | slow calls counted in the hotspot table |
//! | Redirection | [`redirect`] | enter | deprecated call answered by a shim |
//! | Sanitization | [`sanitize`] | enter / exit | SQL text stripped, request parameters escaped |
//!
//! The host only needs to implement [`InterceptionHost`]: accept one
//! [`InstrumentationPass`] holding every rule. [`DispatchTable`] is an
//! in-process host for code that routes its calls through a table.
//!
//! ## Hook order
//!
//! ```text
//! invoke(site, args)
//!   ├─ on_enter (rule order) ── Return(r)? ──► skip body, result = r
//!   ├─ original body (if no rule returned)
//!   └─ on_exit (reverse rule order, normal or error result)
//! ```

pub mod dispatch;
pub mod installer;
pub mod profiler;
pub mod redirect;
pub mod sanitize;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

pub use dispatch::DispatchTable;
pub use installer::{InstallSummary, RuleInstaller, RuleState};
pub use sanitize::SecurityPatterns;

use crate::domain::{HostError, InvocationError, MethodKind, ParamKind, Value};

/// Interface implemented by types that execute SQL text.
pub const SQL_STATEMENT: &str = "java.sql.Statement";

/// Interface implemented by types that expose web-request parameters.
pub const HTTP_REQUEST: &str = "javax.servlet.http.HttpServletRequest";

/// Static description of an instrumentable call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub type_name: String,
    pub method_name: String,
    pub kind: MethodKind,
    pub params: Vec<ParamKind>,
    /// Interfaces the declaring type implements.
    pub implements: Vec<String>,
    /// `type.method(params)`, the hotspot table key.
    pub signature: String,
}

impl CallSite {
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        let mut site = Self {
            type_name: type_name.into(),
            method_name: method_name.into(),
            kind: MethodKind::Instance,
            params: Vec::new(),
            implements: Vec::new(),
            signature: String::new(),
        };
        site.signature = site.render_signature();
        site
    }

    #[must_use]
    pub fn with_kind(mut self, kind: MethodKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: impl IntoIterator<Item = ParamKind>) -> Self {
        self.params = params.into_iter().collect();
        self.signature = self.render_signature();
        self
    }

    #[must_use]
    pub fn implementing(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    #[must_use]
    pub fn implements(&self, interface: &str) -> bool {
        self.implements.iter().any(|i| i == interface)
    }

    fn render_signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        format!("{}.{}({})", self.type_name, self.method_name, params.join(","))
    }
}

/// Which call sites a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteMatcher {
    /// Non-trivial methods of types under any of the prefixes.
    PackagePrefixes(Vec<String>),
    /// One exact method, any signature.
    Method { type_name: String, method_name: String },
    /// `executeQuery`/`executeUpdate(String)` on a SQL statement.
    SqlExecution,
    /// `getParameter`/`getParameterValues` on a web request.
    RequestParameter,
}

impl SiteMatcher {
    #[must_use]
    pub fn matches(&self, site: &CallSite) -> bool {
        match self {
            SiteMatcher::PackagePrefixes(prefixes) => profiler::is_profiled(prefixes, site),
            SiteMatcher::Method { type_name, method_name } => {
                site.type_name == *type_name && site.method_name == *method_name
            }
            SiteMatcher::SqlExecution => sanitize::is_sql_execution(site),
            SiteMatcher::RequestParameter => sanitize::is_request_parameter(site),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Profiling,
    Redirection,
    Sanitization,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Profiling => f.write_str("profiling"),
            RuleKind::Redirection => f.write_str("redirection"),
            RuleKind::Sanitization => f.write_str("sanitization"),
        }
    }
}

/// What the enter hook decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Run the original body (with possibly rewritten arguments).
    Proceed,
    /// Skip the original body and use this result.
    Return(Result<Value, InvocationError>),
}

/// Logic woven around a matched call site. Runs inline on the caller's thread.
pub trait Advice: Send + Sync {
    fn on_enter(&self, _site: &CallSite, _args: &mut [Value]) -> Disposition {
        Disposition::Proceed
    }

    /// Runs after the body (or a replacement result), on success or error.
    fn on_exit(&self, _site: &CallSite, _entered: Instant, _result: &mut Result<Value, InvocationError>) {}
}

/// A matcher bound to its advice.
#[derive(Clone)]
pub struct Rule {
    pub name: String,
    pub kind: RuleKind,
    pub matcher: SiteMatcher,
    pub advice: Arc<dyn Advice>,
}

impl Rule {
    pub fn new(name: impl Into<String>, kind: RuleKind, matcher: SiteMatcher, advice: Arc<dyn Advice>) -> Self {
        Self { name: name.into(), kind, matcher, advice }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

/// Every rule to weave, handed to the host at once so each call site is
/// instrumented in a single pass.
#[derive(Debug, Clone, Default)]
pub struct InstrumentationPass {
    pub rules: Vec<Rule>,
}

impl InstrumentationPass {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    #[must_use]
    pub fn count(&self, kind: RuleKind) -> usize {
        self.rules.iter().filter(|r| r.kind == kind).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The host's instrumentation capability.
pub trait InterceptionHost: Send + Sync {
    /// Weave every rule of `pass` into matching call sites.
    ///
    /// # Errors
    /// Returns an error if the host cannot instrument code.
    fn install_pass(&self, pass: InstrumentationPass) -> Result<(), HostError>;
}
