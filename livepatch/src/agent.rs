//! # Agent
//!
//! The process-scoped context that ties everything together. It owns the
//! applied-version ledger, the hotspot table and the live security patterns,
//! and drives the poll scheduler and the rule installer.
//!
//! Two ways in:
//!
//! - [`Agent::start`] builds a scoped agent; dropping it (or calling
//!   [`Agent::shutdown`]) stops polling and flushes the hotspot report.
//! - [`attach`] starts the single process-wide agent. Attaching again returns
//!   the same agent and starts nothing new. The global agent lives in a
//!   static, which is never dropped: call [`detach`] before the process exits
//!   to stop polling and flush the hotspot report.

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::analysis::HotspotTable;
use crate::applicator::PatchApplicator;
use crate::config::AgentConfig;
use crate::domain::InstallError;
use crate::export::hotspot_csv;
use crate::host::{CodeReplacer, ResolutionChain};
use crate::interception::{InstallSummary, InterceptionHost, RuleInstaller, RuleState, SecurityPatterns};
use crate::ledger::AppliedLedger;
use crate::scheduler::{CycleOutcome, PatchCycle, PollScheduler};
use crate::source::PatchSource;

/// The host capabilities the agent drives.
#[derive(Clone)]
pub struct HostBindings {
    /// Resolution strategies, tried in order.
    pub resolvers: ResolutionChain,
    pub replacer: Arc<dyn CodeReplacer>,
    pub interception: Arc<dyn InterceptionHost>,
}

impl fmt::Debug for HostBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBindings").field("resolvers", &self.resolvers).finish_non_exhaustive()
    }
}

pub struct Agent {
    config: AgentConfig,
    ledger: Arc<AppliedLedger>,
    rule_state: RuleState,
    scheduler: PollScheduler,
    installer: RuleInstaller,
    interception: Arc<dyn InterceptionHost>,
    shut_down: AtomicBool,
}

impl Agent {
    /// Build an agent without starting anything.
    ///
    /// # Errors
    /// Returns an error if the patch transport cannot be constructed.
    pub fn new(config: AgentConfig, bindings: HostBindings) -> Result<Self> {
        let source = PatchSource::from_endpoint(&config.endpoint, config.connect_timeout)
            .with_context(|| format!("Failed to set up patch source {}", config.endpoint))?;
        let ledger = Arc::new(AppliedLedger::new());
        let applicator = Arc::new(PatchApplicator::new(bindings.resolvers, bindings.replacer));
        let cycle = Arc::new(PatchCycle::new(source, Arc::clone(&ledger), applicator));

        Ok(Self {
            config,
            ledger,
            rule_state: RuleState {
                hotspots: Arc::new(HotspotTable::new()),
                patterns: Arc::new(SecurityPatterns::with_defaults()),
            },
            scheduler: PollScheduler::new(cycle),
            installer: RuleInstaller::new(),
            interception: bindings.interception,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Build the agent, install the enabled rules and start polling.
    ///
    /// A refused rule install is logged; polling still starts.
    ///
    /// # Errors
    /// Returns an error if the patch transport or the poller cannot be set up.
    pub fn start(config: AgentConfig, bindings: HostBindings) -> Result<Self> {
        let agent = Self::new(config, bindings)?;
        info!("Starting live patch agent (endpoint {})", agent.config.endpoint);

        if agent.config.any_rules_enabled() {
            if let Err(e) = agent.install_rules() {
                warn!("Failed to install interception rules: {e}");
            }
        }
        agent.start_polling()?;
        Ok(agent)
    }

    /// Install the enabled interception rules, once.
    ///
    /// # Errors
    /// Returns an error if the interception host refuses the pass.
    pub fn install_rules(&self) -> Result<InstallSummary, InstallError> {
        self.installer.install(&self.config, &self.rule_state, self.interception.as_ref())
    }

    /// Start the poll loop at the configured interval. `Ok(false)` if it is
    /// already running.
    ///
    /// # Errors
    /// Returns an error if the poller thread cannot be started.
    pub fn start_polling(&self) -> Result<bool> {
        self.scheduler.start(self.config.poll_interval)
    }

    /// Prevent future poll cycles. `false` if polling was not running.
    pub fn stop_polling(&self) -> bool {
        self.scheduler.stop()
    }

    /// Run one check-apply cycle now, outside the schedule.
    pub async fn check_now(&self) -> CycleOutcome {
        self.scheduler.cycle().run_once().await
    }

    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    #[must_use]
    pub fn ledger(&self) -> &AppliedLedger {
        &self.ledger
    }

    #[must_use]
    pub fn hotspots(&self) -> &Arc<HotspotTable> {
        &self.rule_state.hotspots
    }

    #[must_use]
    pub fn security_patterns(&self) -> &Arc<SecurityPatterns> {
        &self.rule_state.patterns
    }

    #[must_use]
    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    /// The hotspot report as `method,hits` CSV.
    #[must_use]
    pub fn hotspot_report(&self) -> String {
        self.rule_state.hotspots.report_csv()
    }

    /// Write the hotspot report to `<report_dir>/hotspots.csv`.
    ///
    /// # Errors
    /// Returns an error if the report cannot be written.
    pub fn save_hotspot_report(&self) -> Result<PathBuf> {
        hotspot_csv::save_report(&self.rule_state.hotspots, &self.config.report_dir)
    }

    /// Stop polling, wait for the loop to exit and flush the hotspot report.
    ///
    /// Only the first call does anything; it returns the report path if the
    /// report was written.
    pub fn shutdown(&self) -> Option<PathBuf> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.scheduler.shutdown();

        if !self.config.profiler_enabled {
            return None;
        }
        match self.save_hotspot_report() {
            Ok(path) => {
                info!("Hotspot report saved to {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("Failed to save hotspot report: {e:#}");
                None
            }
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("endpoint", &self.config.endpoint)
            .field("scheduler", &self.scheduler)
            .field("rules_installed", &self.installer.is_installed())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// PROCESS-WIDE ATTACH
// =============================================================================

static AGENT: OnceLock<Agent> = OnceLock::new();
static ATTACH_LOCK: Mutex<()> = Mutex::new(());

/// Start the process-wide agent, or return the one already running.
///
/// Later calls ignore their arguments.
///
/// # Errors
/// Returns an error if the first attach cannot start the agent; a later call
/// may retry.
pub fn attach(config: AgentConfig, bindings: HostBindings) -> Result<&'static Agent> {
    if let Some(agent) = AGENT.get() {
        info!("Live patch agent already attached");
        return Ok(agent);
    }

    let _guard = ATTACH_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(agent) = AGENT.get() {
        return Ok(agent);
    }
    let agent = Agent::start(config, bindings)?;
    Ok(AGENT.get_or_init(|| agent))
}

/// The process-wide agent, if attached.
#[must_use]
pub fn attached() -> Option<&'static Agent> {
    AGENT.get()
}

/// Shut down the process-wide agent: stop polling, wait for the poller and
/// flush the hotspot report.
///
/// Returns the report path if it was written. Only the first call after an
/// attach does anything; the agent stays registered, so a later [`attach`]
/// returns it stopped.
pub fn detach() -> Option<PathBuf> {
    let agent = AGENT.get()?;
    info!("Detaching live patch agent");
    agent.shutdown()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DirectoryReplacer;
    use crate::interception::DispatchTable;

    fn bindings() -> HostBindings {
        HostBindings {
            resolvers: ResolutionChain::new(),
            replacer: Arc::new(DirectoryReplacer::new()),
            interception: Arc::new(DispatchTable::new()),
        }
    }

    fn config(dir: &std::path::Path) -> AgentConfig {
        AgentConfig {
            endpoint: dir.join("patches").display().to_string(),
            deprecation_config: dir.join("missing-mappings.json"),
            security_patterns: dir.join("missing-patterns.json"),
            report_dir: dir.join("profiler-data"),
            ..AgentConfig::default()
        }
    }

    #[test]
    fn test_shutdown_flushes_report_once() {
        let dir = tempfile::tempdir().unwrap();
        let agent = Agent::start(config(dir.path()), bindings()).unwrap();
        assert!(agent.scheduler().is_running());
        agent.hotspots().record("com.example.A.run()");

        let path = agent.shutdown().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "method,hits\ncom.example.A.run(),1\n");
        assert!(!agent.scheduler().is_running());
        assert_eq!(agent.shutdown(), None);
    }

    #[test]
    fn test_start_installs_rules() {
        let dir = tempfile::tempdir().unwrap();
        let table = Arc::new(DispatchTable::new());
        let agent = Agent::start(
            config(dir.path()),
            HostBindings { interception: table.clone(), ..bindings() },
        )
        .unwrap();

        assert_eq!(table.len(), 6);
        assert_eq!(agent.install_rules().unwrap(), InstallSummary::AlreadyInstalled);
    }

    #[test]
    fn test_detach_without_attach_is_a_noop() {
        assert!(attached().is_none());
        assert_eq!(detach(), None);
    }
}
