//! Agent configuration
//!
//! Every setting is optional. [`AgentConfig::default`] carries the documented
//! defaults and [`AgentConfig::from_env`] overlays `LIVEPATCH_*` environment
//! variables on top of them. Unparseable values are logged and ignored so a
//! typo in the environment never prevents the agent from attaching.

pub mod loader;

use log::warn;
use std::path::PathBuf;
use std::time::Duration;

pub use loader::{
    default_deprecation_mappings, default_security_patterns, load_deprecation_mappings,
    load_security_patterns, DeprecationMappings,
};

/// Default patch endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/patches";

/// Default poll interval, in minutes.
pub const DEFAULT_POLL_MINUTES: u64 = 5;

/// Default package prefixes observed by the profiler.
pub const DEFAULT_PROFILER_PACKAGES: &[&str] = &["com.example", "org.springframework", "com.company"];

/// Observed when the profiler is enabled with an empty package list.
pub const FALLBACK_PROFILER_PACKAGE: &str = "com.example";

/// Calls slower than this are recorded as hotspots.
pub const DEFAULT_HOTSPOT_THRESHOLD: Duration = Duration::from_millis(50);

/// Connect timeout for the HTTP transport.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// Environment variable names
pub const ENV_ENDPOINT: &str = "LIVEPATCH_ENDPOINT";
pub const ENV_POLL_MINUTES: &str = "LIVEPATCH_POLL_MINUTES";
pub const ENV_PROFILER: &str = "LIVEPATCH_PROFILER";
pub const ENV_DEPRECATION_RESCUE: &str = "LIVEPATCH_DEPRECATION_RESCUE";
pub const ENV_SECURITY_PATCHES: &str = "LIVEPATCH_SECURITY_PATCHES";
pub const ENV_PROFILER_PACKAGES: &str = "LIVEPATCH_PROFILER_PACKAGES";
pub const ENV_DEPRECATION_CONFIG: &str = "LIVEPATCH_DEPRECATION_CONFIG";
pub const ENV_SECURITY_PATTERNS: &str = "LIVEPATCH_SECURITY_PATTERNS";
pub const ENV_REPORT_DIR: &str = "LIVEPATCH_REPORT_DIR";

/// Complete agent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Patch endpoint: an `http(s)://` base URL or a directory path.
    pub endpoint: String,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,

    pub profiler_enabled: bool,
    pub deprecation_rescue_enabled: bool,
    pub security_patches_enabled: bool,

    /// Type-name prefixes the profiling rule matches.
    pub profiler_packages: Vec<String>,
    pub hotspot_threshold: Duration,

    pub deprecation_config: PathBuf,
    pub security_patterns: PathBuf,

    /// Directory the hotspot report is written to at shutdown.
    pub report_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_MINUTES * 60),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            profiler_enabled: true,
            deprecation_rescue_enabled: true,
            security_patches_enabled: true,
            profiler_packages: DEFAULT_PROFILER_PACKAGES.iter().map(|p| (*p).to_string()).collect(),
            hotspot_threshold: DEFAULT_HOTSPOT_THRESHOLD,
            deprecation_config: PathBuf::from("config").join(livepatch_common::DEPRECATION_FILE_NAME),
            security_patterns: PathBuf::from("config")
                .join(livepatch_common::SECURITY_PATTERNS_FILE_NAME),
            report_dir: PathBuf::from("profiler-data"),
        }
    }
}

impl AgentConfig {
    /// Build a configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Keys are the `ENV_*` constants of this module.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|s| !s.trim().is_empty()) {
            config.endpoint = endpoint.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_POLL_MINUTES) {
            match raw.trim().parse::<u64>() {
                Ok(minutes) if minutes > 0 => config.poll_interval = Duration::from_secs(minutes * 60),
                _ => warn!("Ignoring {ENV_POLL_MINUTES}={raw:?}: expected a positive integer"),
            }
        }

        apply_flag(&lookup, ENV_PROFILER, &mut config.profiler_enabled);
        apply_flag(&lookup, ENV_DEPRECATION_RESCUE, &mut config.deprecation_rescue_enabled);
        apply_flag(&lookup, ENV_SECURITY_PATCHES, &mut config.security_patches_enabled);

        if let Some(raw) = lookup(ENV_PROFILER_PACKAGES) {
            config.profiler_packages = parse_package_list(&raw);
        }
        if let Some(path) = lookup(ENV_DEPRECATION_CONFIG) {
            config.deprecation_config = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_SECURITY_PATTERNS) {
            config.security_patterns = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_REPORT_DIR) {
            config.report_dir = PathBuf::from(path);
        }

        config
    }

    /// True if at least one interception rule family is enabled.
    #[must_use]
    pub fn any_rules_enabled(&self) -> bool {
        self.profiler_enabled || self.deprecation_rescue_enabled || self.security_patches_enabled
    }
}

/// Split a comma separated package list, dropping blanks.
#[must_use]
pub fn parse_package_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// Parse a boolean toggle the way property files spell them.
#[must_use]
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn apply_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut bool) {
    if let Some(raw) = lookup(key) {
        match parse_flag(&raw) {
            Some(value) => *target = value,
            None => warn!("Ignoring {key}={raw:?}: expected true or false"),
        }
    }
}
