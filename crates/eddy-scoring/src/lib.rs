//! # eddy-scoring: Turning votes and liquidity into miner weights.
//!
//! Every function here is pure and deterministic; network access and state
//! ownership live in the validator crate.
//!
//! Per iteration:
//! - **Pool weights**: each voter spreads their balance across their voted
//!   pools in proportion to their vote weights; the totals are normalized.
//! - **Position scores**: Gaussian tick proximity (Simpson-averaged over the
//!   position's range) times normalized liquidity, then normalized per pool.
//! - **Miner weights**: normalized position scores weighted by pool weight,
//!   summed per miner, dust-filtered and renormalized.
//! - **Smoothing**: exponential moving average across iterations.
//!
//! On submission the smoothed vector is **quantized** to u16 weights summing
//! to exactly 65535.

pub mod ema;
pub mod miner_weight;
pub mod normalize;
pub mod pool_weight;
pub mod position;
pub mod quantize;

pub use ema::{EmaState, ema_update};
pub use miner_weight::{aggregate_miner_weights, score_miners};
pub use normalize::normalize_pool_scores;
pub use pool_weight::aggregate_pool_weights;
pub use position::{
    average_proximity, gaussian, liquidity_magnitude, score_position, score_positions, sigma_for,
};
pub use quantize::{quantize, uniform_weights};
