//! # Host Live-Replace Capability
//!
//! The agent never touches loaded code itself. It asks the host process for
//! two things:
//!
//! 1. **Resolution** - find the currently loaded unit for a class name. Hosts
//!    usually have more than one place to look, so resolution is an ordered
//!    [`ResolutionChain`] of [`UnitResolver`] strategies; the first hit wins.
//! 2. **Replacement** - swap a resolved unit's executable body for new bytes
//!    ([`CodeReplacer`]). The host must make this all-or-nothing per unit.
//!
//! [`directory`] provides a plugin-directory host: units are files, resolution
//! searches a primary then a fallback root, and replacement is an atomic
//! rename.

pub mod directory;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub use directory::{DirectoryReplacer, DirectoryResolver};

use crate::domain::HostError;

/// A loaded unit located by a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedUnit {
    pub class_name: String,

    /// Host-specific handle (a file path for the directory host).
    pub location: PathBuf,

    /// Name of the resolver strategy that found the unit.
    pub resolved_by: String,
}

/// One strategy for locating a loaded unit by class name.
pub trait UnitResolver: Send + Sync {
    /// Short name for logs (e.g. `"primary"`, `"fallback"`).
    fn name(&self) -> &str;

    fn resolve(&self, class_name: &str) -> Option<LoadedUnit>;
}

/// The host's live-replace operation.
pub trait CodeReplacer: Send + Sync {
    /// Replace the unit's executable body with `body`.
    ///
    /// # Errors
    /// Returns an error if the host rejects the new body; the unit must then
    /// be left unchanged.
    fn replace_unit(&self, unit: &LoadedUnit, body: &[u8]) -> Result<(), HostError>;
}

/// Ordered list of resolution strategies.
#[derive(Clone, Default)]
pub struct ResolutionChain {
    resolvers: Vec<Arc<dyn UnitResolver>>,
}

impl ResolutionChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy; strategies are tried in insertion order.
    #[must_use]
    pub fn then(mut self, resolver: impl UnitResolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    pub fn push(&mut self, resolver: Arc<dyn UnitResolver>) {
        self.resolvers.push(resolver);
    }

    /// Try every strategy in order and return the first hit.
    #[must_use]
    pub fn resolve(&self, class_name: &str) -> Option<LoadedUnit> {
        self.resolvers.iter().find_map(|resolver| {
            let unit = resolver.resolve(class_name);
            if unit.is_none() {
                log::debug!("Resolver {} did not find {class_name}", resolver.name());
            }
            unit
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl fmt::Debug for ResolutionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.resolvers.iter().map(|r| r.name())).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        known: &'static [&'static str],
    }

    impl UnitResolver for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn resolve(&self, class_name: &str) -> Option<LoadedUnit> {
            self.known.contains(&class_name).then(|| LoadedUnit {
                class_name: class_name.to_string(),
                location: PathBuf::from(class_name),
                resolved_by: self.name.to_string(),
            })
        }
    }

    #[test]
    fn test_chain_prefers_primary() {
        let chain = ResolutionChain::new()
            .then(Fixed { name: "primary", known: &["a.A"] })
            .then(Fixed { name: "fallback", known: &["a.A", "b.B"] });

        assert_eq!(chain.resolve("a.A").unwrap().resolved_by, "primary");
        assert_eq!(chain.resolve("b.B").unwrap().resolved_by, "fallback");
        assert!(chain.resolve("c.C").is_none());
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_empty_chain_resolves_nothing() {
        assert!(ResolutionChain::new().resolve("a.A").is_none());
    }
}
