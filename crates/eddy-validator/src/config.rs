//! Validator configuration loaded from `EDDY_*` environment variables.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use eddy_core::constants::{
    BLOCK_POLL_INTERVAL, CACHE_TTL, DEFAULT_COMPUTE_INTERVAL_MS, DEFAULT_EMA_ALPHA,
    DEFAULT_MAX_CONSECUTIVE_ERRORS, DEFAULT_NETUID, DEFAULT_SUBMIT_INTERVAL_BLOCKS,
};
use eddy_core::error::ConfigError;
use zeroize::Zeroizing;

/// When smoothed weights are submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitCadence {
    /// Every `n` ledger blocks, checked by polling the height.
    Blocks(u64),
    /// On a fixed wall-clock interval.
    Interval(Duration),
}

#[derive(Clone)]
pub struct ValidatorConfig {
    pub compute_interval: Duration,
    pub submit_cadence: SubmitCadence,
    /// How often the block cadence polls the ledger height.
    pub block_poll_interval: Duration,
    pub ema_alpha: f64,
    /// Consecutive failures of either cadence that stop the validator. The
    /// process exits when the count reaches this value, not after it.
    pub max_consecutive_errors: u32,
    /// Compute and snapshot, but never submit.
    pub dry_run: bool,
    pub verbose: bool,
    /// Vote indexer GraphQL endpoint.
    pub indexer_url: String,
    /// Balance service root.
    pub balance_url: String,
    /// Miner registry service root.
    pub registry_url: String,
    /// Liquidity position GraphQL endpoint.
    pub positions_url: String,
    /// Ledger node WebSocket endpoint.
    pub ledger_url: String,
    pub netuid: u16,
    /// Hex ed25519 seed. Required unless `dry_run`.
    pub signing_key: Option<Zeroizing<String>>,
    pub data_dir: PathBuf,
    /// `"text"` or `"json"`.
    pub log_format: String,
    pub wait_for_finalization: bool,
    pub cache_ttl: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("eddy");

        Self {
            compute_interval: Duration::from_millis(DEFAULT_COMPUTE_INTERVAL_MS),
            submit_cadence: SubmitCadence::Blocks(DEFAULT_SUBMIT_INTERVAL_BLOCKS),
            block_poll_interval: BLOCK_POLL_INTERVAL,
            ema_alpha: DEFAULT_EMA_ALPHA,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            dry_run: false,
            verbose: false,
            indexer_url: "http://127.0.0.1:8000/graphql".to_string(),
            balance_url: "http://127.0.0.1:8080".to_string(),
            registry_url: "http://127.0.0.1:8081".to_string(),
            positions_url: "http://127.0.0.1:8001/graphql".to_string(),
            ledger_url: "ws://127.0.0.1:9944".to_string(),
            netuid: DEFAULT_NETUID,
            signing_key: None,
            data_dir,
            log_format: "text".to_string(),
            wait_for_finalization: false,
            cache_ttl: CACHE_TTL,
        }
    }
}

impl fmt::Debug for ValidatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorConfig")
            .field("compute_interval", &self.compute_interval)
            .field("submit_cadence", &self.submit_cadence)
            .field("ema_alpha", &self.ema_alpha)
            .field("max_consecutive_errors", &self.max_consecutive_errors)
            .field("dry_run", &self.dry_run)
            .field("indexer_url", &self.indexer_url)
            .field("balance_url", &self.balance_url)
            .field("registry_url", &self.registry_url)
            .field("positions_url", &self.positions_url)
            .field("ledger_url", &self.ledger_url)
            .field("netuid", &self.netuid)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "[REDACTED]"))
            .field("data_dir", &self.data_dir)
            .field("wait_for_finalization", &self.wait_for_finalization)
            .finish_non_exhaustive()
    }
}

impl ValidatorConfig {
    /// Load from the process environment and validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source and validate.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(raw) = var("EDDY_COMPUTE_INTERVAL_MS") {
            config.compute_interval = Duration::from_millis(parse_positive("EDDY_COMPUTE_INTERVAL_MS", &raw)?);
        }
        if let Some(raw) = var("EDDY_SUBMIT_INTERVAL_BLOCKS") {
            config.submit_cadence = SubmitCadence::Blocks(parse_positive("EDDY_SUBMIT_INTERVAL_BLOCKS", &raw)?);
        }
        // A fixed interval overrides the block cadence.
        if let Some(raw) = var("EDDY_SUBMIT_INTERVAL_MS") {
            config.submit_cadence =
                SubmitCadence::Interval(Duration::from_millis(parse_positive("EDDY_SUBMIT_INTERVAL_MS", &raw)?));
        }
        if let Some(raw) = var("EDDY_EMA_ALPHA") {
            config.ema_alpha = raw.parse().map_err(|_| invalid("EDDY_EMA_ALPHA", "must be a number"))?;
        }
        if let Some(raw) = var("EDDY_MAX_CONSECUTIVE_ERRORS") {
            let max = parse_positive("EDDY_MAX_CONSECUTIVE_ERRORS", &raw)?;
            config.max_consecutive_errors =
                u32::try_from(max).map_err(|_| invalid("EDDY_MAX_CONSECUTIVE_ERRORS", "too large"))?;
        }
        if let Some(raw) = var("EDDY_DRY_RUN") {
            config.dry_run = parse_bool("EDDY_DRY_RUN", &raw)?;
        }
        if let Some(raw) = var("EDDY_VERBOSE") {
            config.verbose = parse_bool("EDDY_VERBOSE", &raw)?;
        }
        if let Some(raw) = var("EDDY_WAIT_FOR_FINALIZATION") {
            config.wait_for_finalization = parse_bool("EDDY_WAIT_FOR_FINALIZATION", &raw)?;
        }
        if let Some(url) = var("EDDY_INDEXER_URL") {
            config.indexer_url = url;
        }
        if let Some(url) = var("EDDY_BALANCE_URL") {
            config.balance_url = url;
        }
        if let Some(url) = var("EDDY_REGISTRY_URL") {
            config.registry_url = url;
        }
        if let Some(url) = var("EDDY_POSITIONS_URL") {
            config.positions_url = url;
        }
        if let Some(url) = var("EDDY_LEDGER_URL") {
            config.ledger_url = url;
        }
        if let Some(raw) = var("EDDY_NETUID") {
            config.netuid = raw.parse().map_err(|_| invalid("EDDY_NETUID", "must be an integer in 0..=65535"))?;
        }
        config.signing_key = var("EDDY_SIGNING_KEY").map(Zeroizing::new);
        if let Some(dir) = var("EDDY_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(format) = var("EDDY_LOG_FORMAT") {
            config.log_format = format.to_ascii_lowercase();
        }
        if let Some(raw) = var("EDDY_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(parse_positive("EDDY_CACHE_TTL_SECS", &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints. Call again after applying overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ema_alpha > 0.0 && self.ema_alpha < 1.0) {
            return Err(invalid("EDDY_EMA_ALPHA", "must be strictly between 0 and 1"));
        }
        if self.max_consecutive_errors == 0 {
            return Err(invalid("EDDY_MAX_CONSECUTIVE_ERRORS", "must be at least 1"));
        }
        if self.compute_interval.is_zero() {
            return Err(invalid("EDDY_COMPUTE_INTERVAL_MS", "must be positive"));
        }
        match self.submit_cadence {
            SubmitCadence::Blocks(0) => return Err(invalid("EDDY_SUBMIT_INTERVAL_BLOCKS", "must be positive")),
            SubmitCadence::Interval(d) if d.is_zero() => {
                return Err(invalid("EDDY_SUBMIT_INTERVAL_MS", "must be positive"));
            }
            _ => {}
        }
        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(invalid("EDDY_LOG_FORMAT", "must be `text` or `json`"));
        }
        if !self.dry_run && self.signing_key.is_none() {
            return Err(ConfigError::Missing("EDDY_SIGNING_KEY".to_string()));
        }
        Ok(())
    }

    /// Directory the weight snapshots are written to.
    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    /// Default tracing filter for this configuration.
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}

fn invalid(var: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_positive(var: &str, raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) | Err(_) => Err(invalid(var, "must be a positive integer")),
        Ok(v) => Ok(v),
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, "must be a boolean")),
    }
}
