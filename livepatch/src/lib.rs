//! # livepatch - Live Patch Delivery and Interception Rules
//!
//! livepatch attaches to a running process and changes its behavior without a
//! restart. It does two independent things:
//!
//! 1. **Patch delivery**: periodically fetch a versioned manifest of code
//!    replacements and apply each version exactly once through the host's
//!    live-replace capability.
//! 2. **Interception rules**: weave timing, deprecated-call redirection and
//!    input sanitization around call sites matched by name.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    Patch endpoint (HTTP or dir)                  │
//! │      manifest.json      <version>/<path> bodies                  │
//! └───────────────────────────┬──────────────────────────────────────┘
//!                             │ fetch
//!                             ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         livepatch (Agent)                        │
//! │                                                                  │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐          │
//! │  │  Scheduler   │──▶│    Ledger    │──▶│  Applicator  │──┐       │
//! │  │ (poll loop)  │   │ (versions)   │   │ (per entry)  │  │       │
//! │  └──────────────┘   └──────────────┘   └──────────────┘  │       │
//! │                                                          │       │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐  │       │
//! │  │    Config    │──▶│  Installer   │──▶│  Rules       │  │       │
//! │  │   (JSON)     │   │ (one pass)   │   │ prof/redir/  │  │       │
//! │  └──────────────┘   └──────────────┘   │ sanitize     │  │       │
//! │                                        └──────┬───────┘  │       │
//! │  ┌──────────────┐   ┌──────────────┐          │          │       │
//! │  │   Analysis   │◀──│  Hotspots    │◀─────────┘          │       │
//! │  │   Export     │   │  (counters)  │                     │       │
//! │  └──────────────┘   └──────────────┘                     │       │
//! └──────────────────────────────────────────────────────────┼───────┘
//!                                                            │
//!                    replace_unit / install_pass             ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                Host process (capability traits)                  │
//! │        UnitResolver  ·  CodeReplacer  ·  InterceptionHost        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`source`]: manifest and body transports (HTTP, filesystem)
//! - [`ledger`]: applied `(version, timestamp)` tracking
//! - [`applicator`]: per-entry apply with failure isolation
//! - [`scheduler`]: the check-apply cycle and its background thread
//! - [`host`]: host capability traits and the plugin-directory host
//! - [`interception`]: rule model, the three rule families, the installer
//!   and an in-process dispatch table
//! - [`config`]: agent settings and JSON rule configuration
//! - [`analysis`]: hotspot aggregation
//! - [`export`]: hotspot CSV report
//! - [`agent`]: the process-scoped context, `attach` and `detach`
//! - [`cli`]: command-line arguments of the `livepatch` binary
//! - [`domain`]: error taxonomy and intercepted-call value types
//!
//! ## Typical Usage
//!
//! ```bash
//! # Poll an HTTP endpoint, replacing units under ./plugins
//! livepatch --endpoint http://patches:8080/patches --deploy-dir ./plugins
//!
//! # Apply whatever is published in a local directory, once
//! livepatch --endpoint ./patches --deploy-dir ./plugins --once
//! ```

pub mod agent;
pub mod analysis;
pub mod applicator;
pub mod cli;
pub mod config;
pub mod domain;
pub mod export;
pub mod host;
pub mod interception;
pub mod ledger;
pub mod scheduler;
pub mod source;

pub use agent::{attach, detach, Agent, HostBindings};
