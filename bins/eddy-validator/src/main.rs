//! Eddy validator binary.
//!
//! Periodically scores miners from liquidity votes and their concentrated
//! liquidity positions, smooths the scores, and submits the weight vector to
//! the ledger.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use eddy_core::error::PipelineError;
use eddy_fetch::{
    GraphQlPositionSource, HttpFetcher, IndexerVoteSource, RestBalanceSource, RestRegistrySource,
    RetryPolicy,
};
use eddy_ledger::{LedgerConnection, LedgerSubmitter, ValidatorKey};
use eddy_validator_lib::{
    Scheduler, SchedulerSettings, Sources, ValidatorConfig, ValidatorContext,
};
use tracing::{error, info};

/// Eddy: liquidity-vote weighted scoring validator.
///
/// Every option can also be set through its `EDDY_*` environment variable;
/// flags take precedence.
#[derive(Parser, Debug)]
#[command(name = "eddy-validator", version, about = "Liquidity-vote subnet validator")]
struct Args {
    /// Compute and snapshot weights without submitting them
    #[arg(long)]
    dry_run: bool,

    /// Raise the default log level to debug
    #[arg(short, long)]
    verbose: bool,

    /// Subnet id
    #[arg(long)]
    netuid: Option<u16>,

    /// Ledger node WebSocket endpoint
    #[arg(long)]
    ledger_url: Option<String>,

    /// Directory for snapshots
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log output format ("text" or "json")
    #[arg(long)]
    log_format: Option<String>,

    /// EMA smoothing factor, strictly between 0 and 1
    #[arg(long)]
    ema_alpha: Option<f64>,

    /// Milliseconds between compute iterations
    #[arg(long)]
    compute_interval_ms: Option<u64>,

    /// Submit every N ledger blocks
    #[arg(long, conflicts_with = "submit_interval_ms")]
    submit_interval_blocks: Option<u64>,

    /// Submit on a fixed interval in milliseconds instead of by block
    #[arg(long)]
    submit_interval_ms: Option<u64>,

    /// Treat finalization rather than block inclusion as success
    #[arg(long)]
    wait_for_finalization: bool,
}

impl Args {
    /// Flags rendered as the `EDDY_*` variables they override.
    fn overrides(&self) -> HashMap<&'static str, String> {
        let mut vars = HashMap::new();
        if self.dry_run {
            vars.insert("EDDY_DRY_RUN", "true".to_string());
        }
        if self.verbose {
            vars.insert("EDDY_VERBOSE", "true".to_string());
        }
        if self.wait_for_finalization {
            vars.insert("EDDY_WAIT_FOR_FINALIZATION", "true".to_string());
        }
        if let Some(netuid) = self.netuid {
            vars.insert("EDDY_NETUID", netuid.to_string());
        }
        if let Some(url) = &self.ledger_url {
            vars.insert("EDDY_LEDGER_URL", url.clone());
        }
        if let Some(dir) = &self.data_dir {
            vars.insert("EDDY_DATA_DIR", dir.display().to_string());
        }
        if let Some(format) = &self.log_format {
            vars.insert("EDDY_LOG_FORMAT", format.clone());
        }
        if let Some(alpha) = self.ema_alpha {
            vars.insert("EDDY_EMA_ALPHA", alpha.to_string());
        }
        if let Some(ms) = self.compute_interval_ms {
            vars.insert("EDDY_COMPUTE_INTERVAL_MS", ms.to_string());
        }
        if let Some(blocks) = self.submit_interval_blocks {
            vars.insert("EDDY_SUBMIT_INTERVAL_BLOCKS", blocks.to_string());
        }
        if let Some(ms) = self.submit_interval_ms {
            vars.insert("EDDY_SUBMIT_INTERVAL_MS", ms.to_string());
        }
        vars
    }

    fn into_config(self) -> anyhow::Result<ValidatorConfig> {
        let overrides = self.overrides();
        // A block-interval flag must also beat an interval set in the environment.
        let blocks_flag = self.submit_interval_blocks.is_some();
        ValidatorConfig::from_lookup(|key| {
            if blocks_flag && key == "EDDY_SUBMIT_INTERVAL_MS" {
                return None;
            }
            overrides
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
        })
        .context("invalid configuration")
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("eddy-validator: {e:#}");
            process::exit(2);
        }
    };

    init_logging(config.log_level(), &config.log_format);

    info!("Eddy Validator v{}", env!("CARGO_PKG_VERSION"));
    info!(
        netuid = config.netuid,
        ledger = %config.ledger_url,
        dry_run = config.dry_run,
        data_dir = %config.data_dir.display(),
        "configuration loaded"
    );

    if let Err(e) = run(config).await {
        error!("validator stopped: {e:#}");
        process::exit(1);
    }
    info!("Eddy validator shutdown complete");
}

async fn run(config: ValidatorConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(config.snapshots_dir())
        .with_context(|| format!("failed to create {}", config.snapshots_dir().display()))?;

    let key = config
        .signing_key
        .as_ref()
        .map(|seed| ValidatorKey::from_hex_seed(seed))
        .transpose()
        .context("failed to load EDDY_SIGNING_KEY")?;
    if let Some(key) = &key {
        info!(public_key = %key.public_key_hex(), "signing key loaded");
    }

    let fetcher = HttpFetcher::new(RetryPolicy::transient()).context("failed to build HTTP client")?;
    let sources = Sources {
        votes: Arc::new(IndexerVoteSource::new(fetcher.clone(), config.indexer_url.clone())),
        balances: Arc::new(RestBalanceSource::new(fetcher.clone(), &config.balance_url)),
        registry: Arc::new(RestRegistrySource::new(fetcher.clone(), &config.registry_url)),
        positions: Arc::new(GraphQlPositionSource::new(fetcher, config.positions_url.clone())),
    };

    let connection = LedgerConnection::connect(&config.ledger_url)
        .await
        .with_context(|| format!("failed to connect to ledger at {}", config.ledger_url))?;
    let ledger = LedgerSubmitter::new(connection, key, config.netuid)
        .with_finalization(config.wait_for_finalization);

    let ctx = ValidatorContext::new(config.ema_alpha, config.cache_ttl, config.max_consecutive_errors);
    let mut scheduler = Scheduler::new(sources, Arc::new(ledger), ctx, SchedulerSettings::from_config(&config));

    info!("Eddy validator running (Ctrl+C to stop)");
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl+C, shutting down...");
    };

    match scheduler.run_until(shutdown_signal).await {
        Ok(()) => Ok(()),
        Err(e @ PipelineError::ErrorBudgetExhausted { .. }) => Err(anyhow::Error::new(e)),
        Err(e) => Err(anyhow::Error::new(e).context("scheduler failed")),
    }
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// `RUST_LOG` takes precedence over `level_str`. Pass `format = "json"` for
/// structured JSON output; any other value gives human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_variables() {
        let args = Args::parse_from([
            "eddy-validator",
            "--dry-run",
            "--netuid",
            "9",
            "--ema-alpha",
            "0.3",
            "--submit-interval-ms",
            "60000",
        ]);
        let vars = args.overrides();
        assert_eq!(vars["EDDY_DRY_RUN"], "true");
        assert_eq!(vars["EDDY_NETUID"], "9");
        assert_eq!(vars["EDDY_EMA_ALPHA"], "0.3");
        assert_eq!(vars["EDDY_SUBMIT_INTERVAL_MS"], "60000");
        assert!(!vars.contains_key("EDDY_VERBOSE"));
    }

    #[test]
    fn block_and_interval_flags_conflict() {
        let parsed = Args::try_parse_from([
            "eddy-validator",
            "--submit-interval-blocks",
            "10",
            "--submit-interval-ms",
            "1000",
        ]);
        assert!(parsed.is_err());
    }
}
