//! Builds the enabled rule families and hands them to the host in one pass.

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::profiler::profiling_rule;
use super::redirect::redirection_rules;
use super::sanitize::{sanitization_rules, SecurityPatterns};
use super::{InstrumentationPass, InterceptionHost, RuleKind};
use crate::analysis::HotspotTable;
use crate::config::{load_deprecation_mappings, load_security_patterns, AgentConfig, FALLBACK_PROFILER_PACKAGE};
use crate::domain::InstallError;

/// What `install` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallSummary {
    Installed { profiling: usize, redirection: usize, sanitization: usize },
    /// Rules were installed by an earlier call; nothing was done.
    AlreadyInstalled,
}

/// Shared state the rules write to or read from.
#[derive(Debug, Clone)]
pub struct RuleState {
    pub hotspots: Arc<HotspotTable>,
    pub patterns: Arc<SecurityPatterns>,
}

/// Installs the interception rules at most once.
#[derive(Debug, Default)]
pub struct RuleInstaller {
    installed: AtomicBool,
}

impl RuleInstaller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Load the rule configuration, build every enabled family and install
    /// them in a single instrumentation pass.
    ///
    /// # Errors
    /// Returns an error if the host refuses the pass; a later call may retry.
    pub fn install(
        &self,
        config: &AgentConfig,
        state: &RuleState,
        host: &dyn InterceptionHost,
    ) -> Result<InstallSummary, InstallError> {
        if self.installed.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            debug!("Interception rules already installed");
            return Ok(InstallSummary::AlreadyInstalled);
        }

        let pass = build_pass(config, state);
        let summary = InstallSummary::Installed {
            profiling: pass.count(RuleKind::Profiling),
            redirection: pass.count(RuleKind::Redirection),
            sanitization: pass.count(RuleKind::Sanitization),
        };

        for rule in &pass.rules {
            info!("Installing {} rule {}", rule.kind, rule.name);
        }
        if let Err(e) = host.install_pass(pass) {
            self.installed.store(false, Ordering::Release);
            return Err(e.into());
        }

        info!("Interception rules installed: {summary:?}");
        Ok(summary)
    }
}

/// Every rule the configuration enables.
#[must_use]
pub fn build_pass(config: &AgentConfig, state: &RuleState) -> InstrumentationPass {
    let mut pass = InstrumentationPass::new();

    if config.profiler_enabled {
        let fallback;
        let packages = if config.profiler_packages.is_empty() {
            info!("No profiler packages configured, observing {FALLBACK_PROFILER_PACKAGE}");
            fallback = [FALLBACK_PROFILER_PACKAGE.to_string()];
            &fallback[..]
        } else {
            &config.profiler_packages[..]
        };
        pass.push(profiling_rule(packages, Arc::clone(&state.hotspots), config.hotspot_threshold));
    }

    if config.deprecation_rescue_enabled {
        let mappings = load_deprecation_mappings(&config.deprecation_config);
        pass.rules.extend(redirection_rules(&mappings));
    }

    if config.security_patches_enabled {
        state.patterns.replace_all(&load_security_patterns(&config.security_patterns));
        pass.rules.extend(sanitization_rules(&state.patterns));
    }

    pass
}
