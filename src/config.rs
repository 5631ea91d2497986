use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Request-level search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Index service configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Unindexed backend search configuration
    #[serde(default)]
    pub unindexed: UnindexedConfig,

    /// Boolean (AND/OR) evaluation configuration
    #[serde(default)]
    pub boolean: BooleanConfig,

    /// Search limits that produce alerts
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("CODESEARCH_CONFIG")
            .unwrap_or_else(|_| "config/codesearch.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load configuration layering defaults, the given file and environment
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            // Override with environment variables (prefix: CODESEARCH_)
            .add_source(
                config::Environment::with_prefix("CODESEARCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Deadline used when the query carries no `timeout:` (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Hard cap on any request deadline (milliseconds)
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Number of results returned when the query has no `count:`
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,

    /// Budget granted to optional result types after the required ones finish
    #[serde(default = "default_optional_grace_ms")]
    pub optional_grace_ms: u64,

    /// File match limit used when retrying an empty structural search
    #[serde(default = "default_structural_retry_limit")]
    pub structural_retry_file_match_limit: usize,
}

impl SearchConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    pub fn optional_grace(&self) -> Duration {
        Duration::from_millis(self.optional_grace_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            default_max_results: default_max_results(),
            optional_grace_ms: default_optional_grace_ms(),
            structural_retry_file_match_limit: default_structural_retry_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Whether the index service is consulted at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How long listing the index may take before falling back to unindexed search
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Wall time given to the index when the request has no deadline
    #[serde(default = "default_timeout_ms")]
    pub default_max_wall_time_ms: u64,

    /// Extra time past the wall time before the index call itself is abandoned
    #[serde(default = "default_deadline_slack_ms")]
    pub deadline_slack_ms: u64,

    /// Default result count the index heuristics are calibrated against
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,
}

impl IndexConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn default_max_wall_time(&self) -> Duration {
        Duration::from_millis(self.default_max_wall_time_ms)
    }

    pub fn deadline_slack(&self) -> Duration {
        Duration::from_millis(self.deadline_slack_ms)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probe_timeout_ms: default_probe_timeout_ms(),
            default_max_wall_time_ms: default_timeout_ms(),
            deadline_slack_ms: default_deadline_slack_ms(),
            default_max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnindexedConfig {
    /// Per-repository fetch budget when many repositories are searched
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Fetch budget when a single repository has no request deadline
    #[serde(default = "default_single_repo_fetch_timeout_ms")]
    pub single_repo_fetch_timeout_ms: u64,

    /// Concurrent requests allowed per backend instance
    #[serde(default = "default_requests_per_endpoint")]
    pub requests_per_endpoint: usize,

    /// Attempts per repository, counting the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

impl UnindexedConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn single_repo_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.single_repo_fetch_timeout_ms)
    }
}

impl Default for UnindexedConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            single_repo_fetch_timeout_ms: default_single_repo_fetch_timeout_ms(),
            requests_per_endpoint: default_requests_per_endpoint(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BooleanConfig {
    /// Documents an AND expression wants when the query has no `count:`
    #[serde(default = "default_and_count")]
    pub and_default_count: usize,

    /// Over-fetch multiplier applied to every AND operand
    #[serde(default = "default_and_inflation")]
    pub and_inflation: usize,

    /// Largest per-operand count an AND retry may request
    #[serde(default = "default_max_results_for_retry")]
    pub max_results_for_retry: usize,

    /// Upper bound on AND evaluation rounds
    #[serde(default = "default_and_max_attempts")]
    pub and_max_attempts: usize,
}

impl Default for BooleanConfig {
    fn default() -> Self {
        Self {
            and_default_count: default_and_count(),
            and_inflation: default_and_inflation(),
            max_results_for_retry: default_max_results_for_retry(),
            and_max_attempts: default_and_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Repositories a diff or commit search may cover
    #[serde(default = "default_diff_commit_repo_limit")]
    pub diff_commit_repo_limit: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            diff_commit_repo_limit: default_diff_commit_repo_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
        }
    }
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_timeout_ms() -> u64 {
    60_000
}

fn default_max_results() -> usize {
    30
}

fn default_optional_grace_ms() -> u64 {
    100
}

fn default_structural_retry_limit() -> usize {
    1000
}

fn default_probe_timeout_ms() -> u64 {
    1_000
}

fn default_deadline_slack_ms() -> u64 {
    3_000
}

fn default_fetch_timeout_ms() -> u64 {
    500
}

fn default_single_repo_fetch_timeout_ms() -> u64 {
    60_000
}

fn default_requests_per_endpoint() -> usize {
    32
}

fn default_max_attempts() -> usize {
    2
}

fn default_and_count() -> usize {
    5
}

fn default_and_inflation() -> usize {
    2
}

fn default_max_results_for_retry() -> usize {
    20_000
}

fn default_and_max_attempts() -> usize {
    16
}

fn default_diff_commit_repo_limit() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
