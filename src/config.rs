//! Load test configuration
//!
//! Defaults reproduce the standard order-creation run: 2 req/s for five
//! minutes against a local fulfillment API. Values come from (lowest to
//! highest precedence) built-in defaults, an optional TOML file, then CLI
//! flags / environment variables applied by the binary.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::SetupError;

/// Top-level load test configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestConfig {
    /// Base URL of the fulfillment API (no trailing path)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Local product catalog JSON
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Remote catalog; takes precedence over `catalog_path` when set
    #[serde(default)]
    pub catalog_url: Option<String>,

    /// Arrival rate (dispatches per second)
    #[serde(default = "default_rate_per_sec")]
    pub rate_per_sec: f64,

    /// Run length, e.g. "5m", "30s", "1h30m", "750ms"
    #[serde(default = "default_duration")]
    pub duration: String,

    /// Workers started before the first tick
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,

    /// Concurrency ceiling
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Pause after each completed attempt (ms)
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Per-request HTTP timeout (ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Seed for reproducible payloads (entropy when unset)
    #[serde(default)]
    pub seed: Option<u64>,

    /// Where to write the JSON summary (skipped when unset)
    #[serde(default = "default_summary_path")]
    pub summary_path: Option<String>,

    #[serde(default)]
    pub payload: PayloadConfig,

    #[serde(default)]
    pub thresholds: ThresholdConfig,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_catalog_path() -> String {
    "data/products.json".to_string()
}
fn default_rate_per_sec() -> f64 {
    2.0
}
fn default_duration() -> String {
    "5m".to_string()
}
fn default_min_workers() -> usize {
    5
}
fn default_max_workers() -> usize {
    20
}
fn default_pacing_ms() -> u64 {
    100
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_summary_path() -> Option<String> {
    Some("summary.json".to_string())
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            catalog_path: default_catalog_path(),
            catalog_url: None,
            rate_per_sec: default_rate_per_sec(),
            duration: default_duration(),
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            pacing_ms: default_pacing_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            seed: None,
            summary_path: default_summary_path(),
            payload: PayloadConfig::default(),
            thresholds: ThresholdConfig::default(),
        }
    }
}

impl LoadTestConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `LOADGEN_CONFIG_PATH` or fall back to defaults
    pub fn from_env() -> Self {
        let path = std::env::var("LOADGEN_CONFIG_PATH")
            .unwrap_or_else(|_| "loadgen.toml".to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default load test config ({}): {}", path, e);
            Self::default()
        })
    }

    pub fn run_duration(&self) -> Result<Duration, SetupError> {
        parse_duration(&self.duration)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), SetupError> {
        if !self.rate_per_sec.is_finite() || self.rate_per_sec <= 0.0 {
            return Err(SetupError::invalid_config(format!(
                "rate_per_sec must be positive, got {}",
                self.rate_per_sec
            )));
        }
        let duration = self.run_duration()?;
        if duration.is_zero() {
            return Err(SetupError::invalid_config("duration must be non-zero"));
        }
        if self.min_workers == 0 {
            return Err(SetupError::invalid_config("min_workers must be at least 1"));
        }
        if self.min_workers > self.max_workers {
            return Err(SetupError::invalid_config(format!(
                "min_workers ({}) exceeds max_workers ({})",
                self.min_workers, self.max_workers
            )));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(SetupError::invalid_config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        self.payload.validate()?;
        self.thresholds.validate()
    }

    /// Order-creation endpoint
    pub fn orders_endpoint(&self) -> String {
        format!("{}/fulfillment_orders", self.base_url.trim_end_matches('/'))
    }

    /// Layer CLI / environment values over this config
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(v) = overrides.base_url {
            self.base_url = v;
        }
        if let Some(v) = overrides.catalog_path {
            self.catalog_path = v;
        }
        if let Some(v) = overrides.catalog_url {
            self.catalog_url = Some(v);
        }
        if let Some(v) = overrides.duration {
            self.duration = v;
        }
        if let Some(v) = overrides.rate_per_sec {
            self.rate_per_sec = v;
        }
        if let Some(v) = overrides.min_workers {
            self.min_workers = v;
        }
        if let Some(v) = overrides.max_workers {
            self.max_workers = v;
        }
        if let Some(v) = overrides.seed {
            self.seed = Some(v);
        }
        if let Some(v) = overrides.summary_path {
            self.summary_path = Some(v);
        }
        if overrides.no_summary {
            self.summary_path = None;
        }
    }
}

/// Values set on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub catalog_path: Option<String>,
    pub catalog_url: Option<String>,
    pub duration: Option<String>,
    pub rate_per_sec: Option<f64>,
    pub min_workers: Option<usize>,
    pub max_workers: Option<usize>,
    pub seed: Option<u64>,
    pub summary_path: Option<String>,
    /// Wins over `summary_path`
    pub no_summary: bool,
}

/// Payload synthesis knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadConfig {
    #[serde(default = "default_min_items")]
    pub min_items: usize,

    #[serde(default = "default_max_items")]
    pub max_items: usize,

    #[serde(default = "default_min_quantity")]
    pub min_quantity: u32,

    #[serde(default = "default_max_quantity")]
    pub max_quantity: u32,

    /// Chance an item carries a gift message
    #[serde(default = "default_gift_message_probability")]
    pub gift_message_probability: f64,

    /// Chance an item carries a handling comment
    #[serde(default = "default_comment_probability")]
    pub comment_probability: f64,

    #[serde(default)]
    pub policy_weights: PolicyWeights,
}

fn default_min_items() -> usize {
    2
}
fn default_max_items() -> usize {
    9
}
fn default_min_quantity() -> u32 {
    1
}
fn default_max_quantity() -> u32 {
    5
}
fn default_gift_message_probability() -> f64 {
    0.3
}
fn default_comment_probability() -> f64 {
    0.2
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            min_items: default_min_items(),
            max_items: default_max_items(),
            min_quantity: default_min_quantity(),
            max_quantity: default_max_quantity(),
            gift_message_probability: default_gift_message_probability(),
            comment_probability: default_comment_probability(),
            policy_weights: PolicyWeights::default(),
        }
    }
}

impl PayloadConfig {
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.min_items == 0 || self.min_items > self.max_items {
            return Err(SetupError::invalid_config(format!(
                "item count range [{}, {}] is invalid",
                self.min_items, self.max_items
            )));
        }
        if self.min_quantity == 0 || self.min_quantity > self.max_quantity {
            return Err(SetupError::invalid_config(format!(
                "quantity range [{}, {}] is invalid",
                self.min_quantity, self.max_quantity
            )));
        }
        for (name, p) in [
            ("gift_message_probability", self.gift_message_probability),
            ("comment_probability", self.comment_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SetupError::invalid_config(format!(
                    "{} must be within [0, 1], got {}",
                    name, p
                )));
            }
        }
        self.policy_weights.validate()
    }
}

/// Relative weights of the fulfillment policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyWeights {
    #[serde(default = "default_fill_or_kill")]
    pub fill_or_kill: f64,
    #[serde(default = "default_fill_all")]
    pub fill_all: f64,
    #[serde(default = "default_fill_all_available")]
    pub fill_all_available: f64,
}

fn default_fill_or_kill() -> f64 {
    0.1
}
fn default_fill_all() -> f64 {
    0.2
}
fn default_fill_all_available() -> f64 {
    0.7
}

impl Default for PolicyWeights {
    fn default() -> Self {
        Self {
            fill_or_kill: default_fill_or_kill(),
            fill_all: default_fill_all(),
            fill_all_available: default_fill_all_available(),
        }
    }
}

impl PolicyWeights {
    fn validate(&self) -> Result<(), SetupError> {
        let weights = [self.fill_or_kill, self.fill_all, self.fill_all_available];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SetupError::invalid_config(
                "policy weights must be finite and non-negative",
            ));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(SetupError::invalid_config(
                "at least one policy weight must be positive",
            ));
        }
        Ok(())
    }
}

/// Pass/fail criteria evaluated on the final snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Success rate must exceed this
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,

    /// p95 latency must stay below this (ms)
    #[serde(default = "default_max_p95_ms")]
    pub max_p95_ms: f64,

    /// Transport failure rate must stay below this
    #[serde(default = "default_max_transport_failure_rate")]
    pub max_transport_failure_rate: f64,
}

fn default_min_success_rate() -> f64 {
    0.95
}
fn default_max_p95_ms() -> f64 {
    2_000.0
}
fn default_max_transport_failure_rate() -> f64 {
    0.05
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_success_rate: default_min_success_rate(),
            max_p95_ms: default_max_p95_ms(),
            max_transport_failure_rate: default_max_transport_failure_rate(),
        }
    }
}

impl ThresholdConfig {
    fn validate(&self) -> Result<(), SetupError> {
        for (name, rate) in [
            ("min_success_rate", self.min_success_rate),
            ("max_transport_failure_rate", self.max_transport_failure_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SetupError::invalid_config(format!(
                    "{} must be within [0, 1], got {}",
                    name, rate
                )));
            }
        }
        if self.max_p95_ms <= 0.0 {
            return Err(SetupError::invalid_config("max_p95_ms must be positive"));
        }
        Ok(())
    }
}

/// Parse a run length: "90" (seconds), "30s", "5m", "1h 30m", "2 minutes"
pub fn parse_duration(input: &str) -> Result<Duration, SetupError> {
    let s = input.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| {
        SetupError::invalid_config(format!("cannot parse duration {:?}: {}", input, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoadTestConfig::default();
        assert_eq!(config.rate_per_sec, 2.0);
        assert_eq!(config.min_workers, 5);
        assert_eq!(config.max_workers, 20);
        assert_eq!(config.run_duration().unwrap(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = LoadTestConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: LoadTestConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.max_workers, config.max_workers);
        assert_eq!(parsed.payload.max_items, 9);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: LoadTestConfig = toml::from_str(
            r#"
            rate_per_sec = 10.0
            duration = "30s"

            [payload.policy_weights]
            fill_or_kill = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(parsed.rate_per_sec, 10.0);
        assert_eq!(parsed.base_url, "http://localhost:8080");
        assert_eq!(parsed.payload.policy_weights.fill_or_kill, 0.5);
        assert_eq!(parsed.payload.policy_weights.fill_all_available, 0.7);
        assert_eq!(parsed.run_duration().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_duration("1h 30m").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_duration("5min").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2 minutes").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration(" 1m30s ").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("-3").is_err());
    }

    #[test]
    fn test_spelled_out_duration_is_valid_config() {
        let mut config = LoadTestConfig::default();
        config.duration = "2 minutes".to_string();
        config.validate().unwrap();
        assert_eq!(config.run_duration().unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = LoadTestConfig::default();
        config.min_workers = 30;
        assert!(matches!(config.validate(), Err(SetupError::InvalidConfig(_))));

        let mut config = LoadTestConfig::default();
        config.rate_per_sec = 0.0;
        assert!(config.validate().is_err());

        let mut config = LoadTestConfig::default();
        config.payload.gift_message_probability = 1.5;
        assert!(config.validate().is_err());

        let mut config = LoadTestConfig::default();
        config.payload.policy_weights = PolicyWeights {
            fill_or_kill: 0.0,
            fill_all: 0.0,
            fill_all_available: 0.0,
        };
        assert!(config.validate().is_err());

        let mut config = LoadTestConfig::default();
        config.base_url = "localhost:8080".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_orders_endpoint_trims_slash() {
        let mut config = LoadTestConfig::default();
        config.base_url = "http://api.local/".to_string();
        assert_eq!(config.orders_endpoint(), "http://api.local/fulfillment_orders");
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("loadgen.example.toml");
        let config = LoadTestConfig::load(&path).unwrap();
        assert_eq!(config.seed, None);
        assert_eq!(config.payload, PayloadConfig::default());
        assert_eq!(config.thresholds, ThresholdConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_overrides_win_over_toml() {
        let mut config: LoadTestConfig = toml::from_str(
            r#"
            base_url = "http://staging:9000"
            duration = "10m"
            max_workers = 40
            summary_path = "run.json"
            "#,
        )
        .unwrap();

        config.apply_overrides(ConfigOverrides {
            base_url: Some("http://prod:8080".to_string()),
            duration: Some("30s".to_string()),
            seed: Some(7),
            ..Default::default()
        });

        assert_eq!(config.base_url, "http://prod:8080");
        assert_eq!(config.run_duration().unwrap(), Duration::from_secs(30));
        assert_eq!(config.seed, Some(7));
        // Untouched by overrides
        assert_eq!(config.max_workers, 40);
        assert_eq!(config.summary_path.as_deref(), Some("run.json"));
    }

    #[test]
    fn test_no_summary_beats_summary_path() {
        let mut config = LoadTestConfig::default();
        config.apply_overrides(ConfigOverrides {
            summary_path: Some("other.json".to_string()),
            no_summary: true,
            ..Default::default()
        });
        assert_eq!(config.summary_path, None);

        let mut config = LoadTestConfig::default();
        config.apply_overrides(ConfigOverrides::default());
        assert_eq!(config.summary_path.as_deref(), Some("summary.json"));
    }
}
