//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{parse_package_list, AgentConfig};
use crate::host::directory::DEFAULT_UNIT_EXTENSION;

#[derive(Parser, Debug)]
#[command(
    name = "livepatch",
    version,
    about = "Deliver live patches and interception rules to a running process",
    after_help = "\
EXAMPLES:
    livepatch --deploy-dir ./plugins                          Poll the default endpoint
    livepatch --endpoint ./patches --deploy-dir ./plugins     Patch from a local directory
    livepatch --endpoint http://patches:8080 --once           Run a single check-apply cycle
    livepatch --no-profiler --duration 600                    Stop after ten minutes

Settings not given on the command line are read from LIVEPATCH_* environment variables."
)]
pub struct Args {
    /// Patch endpoint: http(s) base URL or a directory
    #[arg(long, env = "LIVEPATCH_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Minutes between manifest checks
    #[arg(long, env = "LIVEPATCH_POLL_MINUTES", value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_minutes: Option<u64>,

    /// Directory holding the live units (primary resolution root)
    #[arg(long, env = "LIVEPATCH_DEPLOY_DIR", default_value = "deploy")]
    pub deploy_dir: PathBuf,

    /// Directory searched when a unit is not in --deploy-dir
    #[arg(long, env = "LIVEPATCH_FALLBACK_DIR")]
    pub fallback_dir: Option<PathBuf>,

    /// File extension of unit files
    #[arg(long, default_value = DEFAULT_UNIT_EXTENSION)]
    pub unit_extension: String,

    /// Comma separated package prefixes to profile
    #[arg(long, value_name = "PREFIXES")]
    pub profiler_packages: Option<String>,

    /// Disable the profiling rule
    #[arg(long)]
    pub no_profiler: bool,

    /// Disable deprecated-call redirection
    #[arg(long)]
    pub no_deprecation_rescue: bool,

    /// Disable SQL and request-parameter sanitization
    #[arg(long)]
    pub no_security_patches: bool,

    /// Deprecation mappings file
    #[arg(long, value_name = "FILE")]
    pub deprecation_config: Option<PathBuf>,

    /// Security patterns file
    #[arg(long, value_name = "FILE")]
    pub security_patterns: Option<PathBuf>,

    /// Directory the hotspot report is written to on exit
    #[arg(long, value_name = "DIR")]
    pub report_dir: Option<PathBuf>,

    /// Stop after N seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Run one check-apply cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Overlay the command line on `base`.
    #[must_use]
    pub fn apply(&self, mut base: AgentConfig) -> AgentConfig {
        if let Some(endpoint) = &self.endpoint {
            base.endpoint.clone_from(endpoint);
        }
        if let Some(minutes) = self.poll_minutes {
            base.poll_interval = Duration::from_secs(minutes * 60);
        }
        if let Some(packages) = &self.profiler_packages {
            base.profiler_packages = parse_package_list(packages);
        }
        base.profiler_enabled &= !self.no_profiler;
        base.deprecation_rescue_enabled &= !self.no_deprecation_rescue;
        base.security_patches_enabled &= !self.no_security_patches;
        if let Some(path) = &self.deprecation_config {
            base.deprecation_config.clone_from(path);
        }
        if let Some(path) = &self.security_patterns {
            base.security_patterns.clone_from(path);
        }
        if let Some(dir) = &self.report_dir {
            base.report_dir.clone_from(dir);
        }
        base
    }

    /// Run limit, if one was given.
    #[must_use]
    pub fn duration_limit(&self) -> Option<Duration> {
        (self.duration > 0).then(|| Duration::from_secs(self.duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "livepatch",
            "--endpoint",
            "/srv/patches",
            "--poll-minutes",
            "2",
            "--no-profiler",
            "--profiler-packages",
            "billing,orders",
            "--report-dir",
            "/tmp/reports",
        ]);
        let config = args.apply(AgentConfig::default());

        assert_eq!(config.endpoint, "/srv/patches");
        assert_eq!(config.poll_interval, Duration::from_secs(120));
        assert!(!config.profiler_enabled);
        assert!(config.security_patches_enabled);
        assert_eq!(config.profiler_packages, vec!["billing", "orders"]);
        assert_eq!(config.report_dir, PathBuf::from("/tmp/reports"));
    }

    #[test]
    fn test_absent_flags_keep_base() {
        let base = AgentConfig { security_patches_enabled: false, ..AgentConfig::default() };
        let args = Args::parse_from(["livepatch", "--deploy-dir", "plugins"]);
        let config = args.apply(base.clone());

        assert_eq!(config, base);
        assert_eq!(args.deploy_dir, PathBuf::from("plugins"));
        assert_eq!(args.duration_limit(), None);
    }

    #[test]
    fn test_zero_poll_minutes_is_rejected() {
        assert!(Args::try_parse_from(["livepatch", "--poll-minutes", "0"]).is_err());
    }
}
