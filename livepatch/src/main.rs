//! # livepatch - Main Entry Point
//!
//! Supports two operational modes:
//! - **Agent** (default): install the interception rules, poll the endpoint
//!   until Ctrl+C or `--duration`, then flush the hotspot report
//! - **Single cycle** (`--once`): run one check-apply cycle and exit

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::sync::Arc;

use livepatch::cli::Args;
use livepatch::config::AgentConfig;
use livepatch::host::{DirectoryReplacer, DirectoryResolver, ResolutionChain};
use livepatch::interception::DispatchTable;
use livepatch::scheduler::CycleOutcome;
use livepatch::{Agent, HostBindings};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") {
        EXIT_NOPERM
    } else if msg.contains("poll interval") || msg.contains("does not exist") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Plugin-directory host: units are resolved under the deploy dir, then the
/// fallback dir.
fn host_bindings(args: &Args) -> Result<HostBindings> {
    if !args.deploy_dir.is_dir() {
        bail!("Deploy directory {} does not exist", args.deploy_dir.display());
    }
    let mut resolvers = ResolutionChain::new()
        .then(DirectoryResolver::new("primary", &args.deploy_dir).with_extension(&args.unit_extension));
    if let Some(fallback) = &args.fallback_dir {
        resolvers.push(Arc::new(
            DirectoryResolver::new("fallback", fallback).with_extension(&args.unit_extension),
        ));
    }

    Ok(HostBindings {
        resolvers,
        replacer: Arc::new(DirectoryReplacer::new()),
        interception: Arc::new(DispatchTable::new()),
    })
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let config = args.apply(AgentConfig::from_env());
    let bindings = host_bindings(&args)?;

    if !quiet {
        println!("livepatch v{}", env!("CARGO_PKG_VERSION"));
        println!("endpoint: {}", config.endpoint);
        println!("deploy: {}", args.deploy_dir.display());
    }

    if args.once {
        return run_once(config, bindings, quiet).await;
    }

    let agent = livepatch::attach(config, bindings)?;
    if !quiet {
        println!("polling every {}s (Ctrl+C to stop)", agent.config().poll_interval.as_secs());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    match args.duration_limit() {
        Some(limit) => {
            tokio::select! {
                () = tokio::time::sleep(limit) => info!("Duration limit reached"),
                result = &mut ctrl_c => result.context("Failed to listen for Ctrl+C")?,
            }
        }
        None => ctrl_c.await.context("Failed to listen for Ctrl+C")?,
    }

    // Joining the poller blocks; keep it off the async workers.
    let saved = tokio::task::spawn_blocking(livepatch::detach)
        .await
        .context("Shutdown task failed")?;
    if let Some(path) = saved {
        if !quiet {
            println!("saved: {}", path.display());
        }
    }
    Ok(())
}

async fn run_once(config: AgentConfig, bindings: HostBindings, quiet: bool) -> Result<()> {
    let agent = Agent::new(config, bindings)?;
    if agent.config().any_rules_enabled() {
        agent.install_rules().context("Failed to install interception rules")?;
    }

    let outcome = agent.check_now().await;
    if !quiet {
        println!("cycle: {outcome}");
    }
    agent.shutdown();

    if let CycleOutcome::FetchFailed(reason) = outcome {
        bail!("Patch check failed: {reason}");
    }
    Ok(())
}
