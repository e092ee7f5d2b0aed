//! # Patch Applicator
//!
//! Applies every entry of a manifest against the host's live-replace
//! capability, in manifest order, isolating failures per entry.
//!
//! ```text
//! PatchEntry ──► fetch body ──► resolve unit ──► replace_unit
//!                   │                │                 │
//!             NotFound/empty     no resolver        rejected
//!                   ▼                ▼                 ▼
//!                Skipped          Skipped            Failed
//! ```
//!
//! A batch of ten entries where one is stale or malformed still delivers the
//! other nine. The caller commits the version only after every entry has been
//! attempted.

use livepatch_common::{PatchEntry, PatchManifest};
use log::{error, info, warn};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::ApplyError;
use crate::host::{CodeReplacer, ResolutionChain};
use crate::source::{fs::is_contained, Fetched, PatchSource};

/// Why an entry was skipped without being treated as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The endpoint has no body at the entry's path.
    BodyNotFound,
    /// The endpoint served an empty body.
    EmptyBody,
    /// No resolution strategy found the class.
    Unresolved,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::BodyNotFound => f.write_str("no patch body found"),
            SkipReason::EmptyBody => f.write_str("patch body is empty"),
            SkipReason::Unresolved => f.write_str("class not found"),
        }
    }
}

/// Outcome of one manifest entry.
#[derive(Debug)]
pub enum EntryOutcome {
    Applied { resolved_by: String, bytes: usize },
    Skipped(SkipReason),
    Failed(ApplyError),
}

impl EntryOutcome {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, EntryOutcome::Applied { .. })
    }
}

/// Per-entry results of one manifest application, in manifest order.
#[derive(Debug)]
pub struct ApplyReport {
    pub version: String,
    pub timestamp: i64,
    pub outcomes: Vec<(PatchEntry, EntryOutcome)>,
}

impl ApplyReport {
    #[must_use]
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_applied()).count()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| matches!(o, EntryOutcome::Skipped(_))).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| matches!(o, EntryOutcome::Failed(_))).count()
    }

    /// Outcome for a class, if the manifest named it.
    #[must_use]
    pub fn outcome_for(&self, class_name: &str) -> Option<&EntryOutcome> {
        self.outcomes.iter().find(|(e, _)| e.class_name == class_name).map(|(_, o)| o)
    }
}

/// Held for a whole batch by every applicator in the process: overlapping
/// redefinitions are unsafe even across agents.
static APPLY_LOCK: Mutex<()> = Mutex::const_new(());

/// Applies manifests through the host capability.
pub struct PatchApplicator {
    resolvers: ResolutionChain,
    replacer: Arc<dyn CodeReplacer>,
}

impl PatchApplicator {
    pub fn new(resolvers: ResolutionChain, replacer: Arc<dyn CodeReplacer>) -> Self {
        Self { resolvers, replacer }
    }

    /// Apply every entry of `manifest` in order.
    ///
    /// Never fails as a whole; each entry's result is in the report.
    pub async fn apply(&self, source: &PatchSource, manifest: &PatchManifest) -> ApplyReport {
        let _guard = APPLY_LOCK.lock().await;

        if manifest.is_empty() {
            info!("No patches found in manifest {}", manifest.version);
        }

        let mut outcomes = Vec::with_capacity(manifest.patches.len());
        for entry in &manifest.patches {
            let outcome = self.apply_entry(source, &manifest.version, entry).await;
            match &outcome {
                EntryOutcome::Applied { resolved_by, bytes } => {
                    info!("Applied patch for {} ({bytes} bytes, via {resolved_by})", entry.class_name);
                }
                EntryOutcome::Skipped(reason) => {
                    warn!("Skipping patch for {}: {reason} ({})", entry.class_name, entry.path);
                }
                EntryOutcome::Failed(e) => {
                    error!("Failed to apply patch for class {}: {e}", entry.class_name);
                }
            }
            outcomes.push((entry.clone(), outcome));
        }

        ApplyReport { version: manifest.version.clone(), timestamp: manifest.timestamp, outcomes }
    }

    async fn apply_entry(&self, source: &PatchSource, version: &str, entry: &PatchEntry) -> EntryOutcome {
        if matches!(source, PatchSource::Fs(_)) && !is_contained(&entry.path) {
            return EntryOutcome::Failed(ApplyError::InvalidPath {
                class_name: entry.class_name.clone(),
                path: entry.path.clone(),
            });
        }

        let body = match source.fetch_body(version, &entry.path).await {
            Ok(Fetched::Found(body)) if body.is_empty() => {
                return EntryOutcome::Skipped(SkipReason::EmptyBody)
            }
            Ok(Fetched::Found(body)) => body,
            Ok(Fetched::NotFound) => return EntryOutcome::Skipped(SkipReason::BodyNotFound),
            Err(source) => {
                return EntryOutcome::Failed(ApplyError::Transport {
                    class_name: entry.class_name.clone(),
                    source,
                })
            }
        };

        let Some(unit) = self.resolvers.resolve(&entry.class_name) else {
            return EntryOutcome::Skipped(SkipReason::Unresolved);
        };

        match self.replacer.replace_unit(&unit, &body) {
            Ok(()) => EntryOutcome::Applied { resolved_by: unit.resolved_by, bytes: body.len() },
            Err(source) => EntryOutcome::Failed(ApplyError::ReplaceRejected {
                class_name: entry.class_name.clone(),
                source,
            }),
        }
    }
}

impl fmt::Debug for PatchApplicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchApplicator").field("resolvers", &self.resolvers).finish_non_exhaustive()
    }
}
