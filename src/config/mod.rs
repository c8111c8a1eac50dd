//! Typed configuration from environment variables and an optional TOML file.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. Sensitive values wrapped in secrecy::SecretString to prevent
//! log leaks.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            engine: EngineConfig::default().with_env_overrides()?,
        })
    }

    /// Like [`Config::from_env`], but engine settings start from a TOML file.
    /// Environment variables still take precedence over the file.
    pub fn load(engine_file: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Some(path) = engine_file {
            config.engine = EngineConfig::from_file(path)?.with_env_overrides()?;
        }
        Ok(config)
    }
}

/// Settings consumed by the due-date engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Time between reconciliation sweeps.
    pub sweep_interval: Duration,
    /// Delay before the first sweep after start.
    pub initial_sweep_delay: Duration,
    /// When false, no per-item timers are installed and only the sweep
    /// transitions items.
    pub scheduler_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            initial_sweep_delay: Duration::ZERO,
            scheduler_enabled: true,
        }
    }
}

/// On-disk form of [`EngineConfig`]. Durations are whole seconds.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EngineFile {
    sweep_interval_secs: Option<u64>,
    initial_sweep_delay_secs: Option<u64>,
    scheduler_enabled: Option<bool>,
}

impl EngineConfig {
    /// Parse engine settings from TOML. Missing keys keep their defaults.
    ///
    /// ```toml
    /// sweep_interval_secs = 60
    /// initial_sweep_delay_secs = 5
    /// scheduler_enabled = true
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: EngineFile =
            toml::from_str(s).map_err(|e| Error::Config(format!("invalid engine config: {e}")))?;
        let defaults = Self::default();
        let config = Self {
            sweep_interval: file
                .sweep_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            initial_sweep_delay: file
                .initial_sweep_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.initial_sweep_delay),
            scheduler_enabled: file.scheduler_enabled.unwrap_or(defaults.scheduler_enabled),
        };
        config.validate()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read engine config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Apply `SWEEP_INTERVAL_SECS`, `SWEEP_INITIAL_DELAY_SECS` and
    /// `SCHEDULER_ENABLED` on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(secs) = optional_parsed::<u64>("SWEEP_INTERVAL_SECS")? {
            self.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = optional_parsed::<u64>("SWEEP_INITIAL_DELAY_SECS")? {
            self.initial_sweep_delay = Duration::from_secs(secs);
        }
        if let Some(enabled) = optional_parsed::<bool>("SCHEDULER_ENABLED")? {
            self.scheduler_enabled = enabled;
        }
        self.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.sweep_interval.is_zero() {
            return Err(Error::Config(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid value for {name}: {e}"))),
        Err(_) => Ok(None),
    }
}
