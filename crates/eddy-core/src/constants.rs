//! Protocol and pipeline constants.

use std::time::Duration;

/// Fixed-point total every submitted weight vector must sum to.
pub const WEIGHT_TOTAL: u16 = u16::MAX;

/// Upper bound of a single vote weight (basis points of a voter's allocation).
pub const MAX_VOTE_WEIGHT: u16 = 10_000;

/// Miner weights at or below this value are treated as floating-point residue.
pub const MINER_DUST_THRESHOLD: f64 = 1e-8;

/// Divisor turning raw pool liquidity into a unitless magnitude.
pub const LIQUIDITY_NORMALIZER: f64 = 1e9;

/// Peak value of the tick-proximity Gaussian.
pub const GAUSSIAN_AMPLITUDE: f64 = 1.0;

/// Proximity standard deviations, in ticks, per fee tier.
pub const SIGMA_FEE_100: f64 = 50.0;
pub const SIGMA_FEE_500: f64 = 200.0;
pub const SIGMA_FEE_3000: f64 = 1_000.0;
pub const SIGMA_FEE_10000: f64 = 3_000.0;

/// Records per indexer page when ingesting votes.
pub const VOTE_PAGE_SIZE: usize = 1_000;

/// Records per page requested from the balance service.
pub const BALANCE_PAGE_SIZE: usize = 1_000;

/// Owner addresses per liquidity position query.
pub const POSITION_OWNER_BATCH: usize = 100;

/// Positions per page within one owner batch.
pub const POSITION_PAGE_SIZE: usize = 1_000;

/// Maximum owner batches in flight at once.
pub const MAX_CONCURRENT_BATCHES: usize = 8;

/// Safety stop for any paginated walk.
pub const MAX_PAGES: u32 = 10_000;

/// Hard timeout for read-only queries.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Hard timeout for a weight submission to reach inclusion.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default retry budget for rate-limited queries.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// First backoff delay for query retries.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Ceiling for query retry backoff.
pub const RETRY_CAP_DELAY: Duration = Duration::from_secs(30);

/// Freshness window of cached vote and balance responses.
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// First ledger reconnection delay.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Ceiling for ledger reconnection backoff.
pub const RECONNECT_CAP_DELAY: Duration = Duration::from_secs(30);

/// How often the scheduler polls the ledger height for the block cadence.
pub const BLOCK_POLL_INTERVAL: Duration = Duration::from_secs(12);

pub const DEFAULT_COMPUTE_INTERVAL_MS: u64 = 300_000;
pub const DEFAULT_SUBMIT_INTERVAL_BLOCKS: u64 = 101;
pub const DEFAULT_EMA_ALPHA: f64 = 0.1;
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;
pub const DEFAULT_NETUID: u16 = 1;
