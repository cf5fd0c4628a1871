//! Configuration
//!
//! Provides hierarchical configuration loading from:
//! - `causal.toml` (default configuration)
//! - `causal.local.toml` (git-ignored local overrides)
//! - Environment variables (`CAUSAL_*` prefix)
//!
//! ## Example
//!
//! ```toml
//! # causal.toml
//! [inference]
//! minimal_sets = true
//! deconfounding_policy = "random"
//! depth_bound = 6
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! CAUSAL_INFERENCE__DEPTH_BOUND=8
//! CAUSAL_INFERENCE__SEED=42
//! ```
//!
//! Nothing in the core reads `Config` implicitly: it is always passed in
//! explicitly as a parameter to the operations that need it (model
//! validation tolerance, the do-calculus search, the deconfounding-set
//! policy). There is no process-wide singleton.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub inference: InferenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Numeric and search knobs a caller may override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// CPT row-group normalization tolerance.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Evaluator numeric-drift epsilon.
    #[serde(default = "default_numeric_epsilon")]
    pub numeric_epsilon: f64,

    /// Report only set-inclusion-minimal deconfounding sets.
    #[serde(default)]
    pub minimal_sets: bool,

    /// How a deconfounding set is chosen when more than one blocks all
    /// backdoor paths.
    #[serde(default)]
    pub deconfounding_policy: DeconfoundingPolicy,

    /// Iterative-deepening depth bound for the do-calculus search.
    #[serde(default = "default_depth_bound")]
    pub depth_bound: usize,

    /// Optional ceiling on total rewrite attempts across the whole search.
    #[serde(default)]
    pub step_budget: Option<usize>,

    /// Seed for the deconfounding-set RNG (`Random` policy) and for any
    /// other place the search needs deterministic randomness.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Deconfounding-set selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeconfoundingPolicy {
    /// Let the caller pick among the reported sets.
    Ask,
    /// Pick uniformly at random among the reported sets.
    #[default]
    Random,
    /// Average over every reported set, or verify they agree numerically.
    All,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn`, or `error`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `text` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_tolerance() -> f64 {
    1e-5
}
fn default_numeric_epsilon() -> f64 {
    1e-6
}
fn default_depth_bound() -> usize {
    6
}
fn default_seed() -> u64 {
    0
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// Merges in order:
    /// 1. `causal.toml` (base configuration)
    /// 2. `causal.local.toml` (local overrides, git-ignored)
    /// 3. Environment variables (`CAUSAL_*` prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("causal.toml"))
            .merge(Toml::file("causal.local.toml"))
            .merge(Env::prefixed("CAUSAL_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CAUSAL_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            inference: InferenceConfig {
                tolerance: default_tolerance(),
                numeric_epsilon: default_numeric_epsilon(),
                minimal_sets: false,
                deconfounding_policy: DeconfoundingPolicy::default(),
                depth_bound: default_depth_bound(),
                step_budget: None,
                seed: default_seed(),
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.inference.tolerance, 1e-5);
        assert_eq!(config.inference.numeric_epsilon, 1e-6);
        assert!(!config.inference.minimal_sets);
        assert_eq!(config.inference.deconfounding_policy, DeconfoundingPolicy::Random);
        assert_eq!(config.inference.depth_bound, 6);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[inference]"));
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.inference.depth_bound, config.inference.depth_bound);
    }
}
