//! Application configuration.
//!
//! Settings are read from `config/config.toml` (optional) and then from
//! environment variables prefixed with `JASPEL` using `__` as the section
//! separator, e.g. `JASPEL__APP__ENVIRONMENT=production` or
//! `JASPEL__CACHE__SUMMARY_TTL_SECS=120`.

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_FILE: &str = "config/config.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    Production,
    #[default]
    Development,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, RuntimeEnvironment::Production)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,
    /// Expose internal error detail in 500 responses
    #[serde(default)]
    pub debug: bool,
    /// Name of the admin account created when the store holds no users
    #[serde(default = "default_bootstrap_admin")]
    pub bootstrap_admin: Option<String>,
}

fn default_bootstrap_admin() -> Option<String> {
    Some("admin".to_string())
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            environment: RuntimeEnvironment::default(),
            debug: false,
            bootstrap_admin: default_bootstrap_admin(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_workers() -> usize {
    4
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_counts_ttl")]
    pub counts_ttl_secs: u64,
    #[serde(default = "default_summary_ttl")]
    pub summary_ttl_secs: u64,
    #[serde(default = "default_user_summary_ttl")]
    pub user_summary_ttl_secs: u64,
}

fn default_counts_ttl() -> u64 {
    60
}

fn default_summary_ttl() -> u64 {
    300
}

fn default_user_summary_ttl() -> u64 {
    600
}

impl CacheSettings {
    pub fn counts_ttl(&self) -> Duration {
        Duration::from_secs(self.counts_ttl_secs)
    }

    pub fn summary_ttl(&self) -> Duration {
        Duration::from_secs(self.summary_ttl_secs)
    }

    pub fn user_summary_ttl(&self) -> Duration {
        Duration::from_secs(self.user_summary_ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            counts_ttl_secs: default_counts_ttl(),
            summary_ttl_secs: default_summary_ttl(),
            user_summary_ttl_secs: default_user_summary_ttl(),
        }
    }
}

/// Thresholds of the JaspelEntry input rule. Amounts are whole rupiah.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_max_amount")]
    pub max_amount: i64,
    /// Accepted deviation from the tariff-derived amount, in percent
    #[serde(default = "default_tolerance_percent")]
    pub tolerance_percent: u32,
    #[serde(default = "default_dummy_amounts")]
    pub dummy_amounts: Vec<i64>,
    /// Amounts above this that are exact multiples of `round_number_step` look like test data
    #[serde(default = "default_round_number_floor")]
    pub round_number_floor: i64,
    #[serde(default = "default_round_number_step")]
    pub round_number_step: i64,
    #[serde(default = "default_min_note_length")]
    pub min_note_length: usize,
    /// Above this amount a justification note is expected
    #[serde(default = "default_large_amount")]
    pub large_amount: i64,
}

fn default_max_amount() -> i64 {
    10_000_000
}

fn default_tolerance_percent() -> u32 {
    20
}

fn default_dummy_amounts() -> Vec<i64> {
    vec![11_111, 12_345, 99_999, 111_111, 123_456, 999_999, 1_000_000, 1_234_567]
}

fn default_round_number_floor() -> i64 {
    100_000
}

fn default_round_number_step() -> i64 {
    10_000
}

fn default_min_note_length() -> usize {
    20
}

fn default_large_amount() -> i64 {
    1_000_000
}

impl ValidationConfig {
    pub fn max_amount(&self) -> Decimal {
        Decimal::from(self.max_amount)
    }

    pub fn tolerance(&self) -> Decimal {
        Decimal::from(self.tolerance_percent) / Decimal::ONE_HUNDRED
    }

    pub fn large_amount(&self) -> Decimal {
        Decimal::from(self.large_amount)
    }

    /// Heuristic for placeholder amounts typed in during testing.
    pub fn looks_like_dummy(&self, amount: Decimal) -> bool {
        if self
            .dummy_amounts
            .iter()
            .any(|dummy| Decimal::from(*dummy) == amount)
        {
            return true;
        }
        let step = Decimal::from(self.round_number_step);
        !step.is_zero()
            && amount > Decimal::from(self.round_number_floor)
            && (amount % step).is_zero()
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_amount: default_max_amount(),
            tolerance_percent: default_tolerance_percent(),
            dummy_amounts: default_dummy_amounts(),
            round_number_floor: default_round_number_floor(),
            round_number_step: default_round_number_step(),
            min_note_length: default_min_note_length(),
            large_amount: default_large_amount(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSettings {
    /// JSON snapshot written after every commit; in-memory only when unset
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub store: StoreSettings,
}

impl AppConfig {
    /// Load configuration from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("JASPEL").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // An unreadable file should not take the service down; env still applies
                if std::path::Path::new(path).exists() {
                    log::warn!(
                        "failed to load config file {}, falling back to env: {}",
                        path,
                        err
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix("JASPEL").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        settings.try_deserialize::<AppConfig>().map_err(|e| {
            ConfigError::Message(format!("Configuration could not be deserialized: {}", e))
        })
    }
}
