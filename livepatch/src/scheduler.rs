//! # Poll Scheduler
//!
//! Drives the check-apply cycle on one dedicated background thread.
//!
//! ```text
//! livepatch-poller thread (current-thread tokio runtime)
//!   tick ──► fetch manifest ──► ledger.should_apply ──► applicator.apply ──► ledger.commit
//!    ▲                                                                          │
//!    └──────────────────────────── every interval ◄─────────────────────────────┘
//! ```
//!
//! The first cycle runs as soon as the scheduler starts. `stop()` prevents any
//! future cycle from starting but never interrupts one that is applying
//! patches; `shutdown()` additionally waits for the loop thread to exit.

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::applicator::{ApplyReport, PatchApplicator};
use crate::ledger::AppliedLedger;
use crate::source::{Fetched, PatchSource};

/// Name of the background polling thread.
pub const POLLER_THREAD_NAME: &str = "livepatch-poller";

/// Result of one check-apply cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The endpoint has nothing published.
    NoManifest,
    /// The manifest's version was already applied at this timestamp or later.
    AlreadyApplied { version: String, timestamp: i64 },
    Applied(ApplyReport),
    /// Transport or decode failure; retried next cycle.
    FetchFailed(String),
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::NoManifest => f.write_str("no manifest published"),
            CycleOutcome::AlreadyApplied { version, timestamp } => {
                write!(f, "version {version} already applied (timestamp {timestamp})")
            }
            CycleOutcome::Applied(report) => write!(
                f,
                "version {} applied: {} applied, {} skipped, {} failed",
                report.version,
                report.applied(),
                report.skipped(),
                report.failed()
            ),
            CycleOutcome::FetchFailed(reason) => write!(f, "fetch failed: {reason}"),
        }
    }
}

/// One fetch -> filter -> apply -> commit cycle.
pub struct PatchCycle {
    source: PatchSource,
    ledger: Arc<AppliedLedger>,
    applicator: Arc<PatchApplicator>,
    /// Cycles never overlap, even when driven from several callers.
    cycle_lock: tokio::sync::Mutex<()>,
}

impl PatchCycle {
    pub fn new(source: PatchSource, ledger: Arc<AppliedLedger>, applicator: Arc<PatchApplicator>) -> Self {
        Self { source, ledger, applicator, cycle_lock: tokio::sync::Mutex::new(()) }
    }

    #[must_use]
    pub fn source(&self) -> &PatchSource {
        &self.source
    }

    #[must_use]
    pub fn ledger(&self) -> &AppliedLedger {
        &self.ledger
    }

    /// Run one cycle to completion.
    pub async fn run_once(&self) -> CycleOutcome {
        let _guard = self.cycle_lock.lock().await;

        let manifest = match self.source.fetch_manifest().await {
            Ok(Fetched::Found(manifest)) => manifest,
            Ok(Fetched::NotFound) => {
                debug!("No patch manifest at {}", self.source.endpoint());
                return CycleOutcome::NoManifest;
            }
            Err(e) => {
                warn!("Error checking for patches: {e}");
                return CycleOutcome::FetchFailed(e.to_string());
            }
        };

        if !self.ledger.should_apply(&manifest.version, manifest.timestamp) {
            debug!("Patch version {} already applied", manifest.version);
            return CycleOutcome::AlreadyApplied { version: manifest.version, timestamp: manifest.timestamp };
        }

        info!("Applying patch version {} ({} entries)", manifest.version, manifest.patches.len());
        let report = self.applicator.apply(&self.source, &manifest).await;
        self.ledger.commit(&manifest.version, manifest.timestamp);
        info!(
            "Patch version {} done: {} applied, {} skipped, {} failed",
            report.version,
            report.applied(),
            report.skipped(),
            report.failed()
        );
        CycleOutcome::Applied(report)
    }
}

impl fmt::Debug for PatchCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchCycle").field("source", &self.source).finish_non_exhaustive()
    }
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the lifecycle of the polling thread.
pub struct PollScheduler {
    cycle: Arc<PatchCycle>,
    running: Mutex<Option<Running>>,
    /// Loop threads that were signalled but not yet joined.
    stopping: Mutex<Vec<JoinHandle<()>>>,
}

impl PollScheduler {
    pub fn new(cycle: Arc<PatchCycle>) -> Self {
        Self { cycle, running: Mutex::new(None), stopping: Mutex::new(Vec::new()) }
    }

    #[must_use]
    pub fn cycle(&self) -> &Arc<PatchCycle> {
        &self.cycle
    }

    /// Start polling every `interval`, beginning immediately.
    ///
    /// Returns `Ok(false)` if the loop is already running.
    ///
    /// # Errors
    /// Returns an error if `interval` is zero or the poller thread or its
    /// runtime cannot be created.
    pub fn start(&self, interval: Duration) -> Result<bool> {
        if interval.is_zero() {
            bail!("Poll interval must be greater than zero");
        }

        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Poll scheduler already running");
            return Ok(false);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build poller runtime")?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cycle = Arc::clone(&self.cycle);

        let handle = std::thread::Builder::new()
            .name(POLLER_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(poll_loop(cycle, interval, shutdown_rx)))
            .context("Failed to spawn poller thread")?;

        info!(
            "Patch polling started: {} every {}s",
            self.cycle.source().endpoint(),
            interval.as_secs()
        );
        *running = Some(Running { shutdown_tx, handle });
        Ok(true)
    }

    /// Signal the loop to stop after any in-flight cycle.
    ///
    /// Returns `false` if the loop was not running.
    pub fn stop(&self) -> bool {
        let Some(Running { shutdown_tx, handle }) =
            self.running.lock().unwrap_or_else(PoisonError::into_inner).take()
        else {
            return false;
        };
        let _ = shutdown_tx.send(true);
        self.stopping.lock().unwrap_or_else(PoisonError::into_inner).push(handle);
        info!("Patch polling stopped");
        true
    }

    /// Stop and wait for the loop thread to exit.
    pub fn shutdown(&self) {
        self.stop();
        let handles: Vec<_> =
            self.stopping.lock().unwrap_or_else(PoisonError::into_inner).drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("Poller thread panicked");
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollScheduler")
            .field("cycle", &self.cycle)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn poll_loop(cycle: Arc<PatchCycle>, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {
                let outcome = cycle.run_once().await;
                debug!("Poll cycle: {outcome}");
            }
        }
    }
    debug!("Poll loop exited");
}
