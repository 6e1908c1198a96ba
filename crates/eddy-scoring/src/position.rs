//! Liquidity position scoring.
//!
//! A position's score is the product of two factors:
//!
//! - **Proximity**: how close the pool's current tick sits to the position's
//!   range, measured with a Gaussian `A·exp(−d²/(2σ²))`. Instead of sampling a
//!   single point, the Gaussian is averaged over the range with Simpson's rule
//!   on the lower bound, midpoint and upper bound (weights 1:4:1, divided by
//!   6). Tight in-range positions score highest and there is no hard cliff at
//!   the range edges.
//! - **Magnitude**: raw liquidity divided by [`LIQUIDITY_NORMALIZER`].
//!
//! σ depends on the fee tier: stable pairs (low fee) move little and get a
//! tight σ, volatile pairs a wide one.

use eddy_core::constants::{
    GAUSSIAN_AMPLITUDE, LIQUIDITY_NORMALIZER, SIGMA_FEE_100, SIGMA_FEE_10000, SIGMA_FEE_3000,
    SIGMA_FEE_500,
};
use eddy_core::types::{FeeTier, LiquidityPosition, PositionScores};
use tracing::{debug, warn};

/// Proximity standard deviation in ticks for a fee tier.
///
/// Unrecognized tiers use the 0.3% bucket.
pub fn sigma_for(fee_tier: FeeTier) -> f64 {
    match fee_tier {
        FeeTier::Lowest => SIGMA_FEE_100,
        FeeTier::Low => SIGMA_FEE_500,
        FeeTier::Medium | FeeTier::Other(_) => SIGMA_FEE_3000,
        FeeTier::High => SIGMA_FEE_10000,
    }
}

/// Gaussian proximity for a tick distance.
pub fn gaussian(distance: f64, sigma: f64) -> f64 {
    GAUSSIAN_AMPLITUDE * (-(distance * distance) / (2.0 * sigma * sigma)).exp()
}

/// Simpson's-rule average of the proximity Gaussian across `[lower, upper]`.
pub fn average_proximity(current_tick: i32, tick_lower: i32, tick_upper: i32, sigma: f64) -> f64 {
    let current = f64::from(current_tick);
    let lower = f64::from(tick_lower);
    let upper = f64::from(tick_upper);
    let mid = (lower + upper) / 2.0;

    (gaussian(current - lower, sigma)
        + 4.0 * gaussian(current - mid, sigma)
        + gaussian(current - upper, sigma))
        / 6.0
}

/// Liquidity as a unitless magnitude.
pub fn liquidity_magnitude(liquidity: u128) -> f64 {
    liquidity as f64 / LIQUIDITY_NORMALIZER
}

/// Score one position. Degenerate positions score 0.
pub fn score_position(position: &LiquidityPosition) -> f64 {
    let Some(current_tick) = position.current_tick else {
        debug!(position = %position.id, pool = %position.pool_id, "position: pool has no current tick, scoring 0");
        return 0.0;
    };
    if position.tick_lower >= position.tick_upper {
        warn!(
            position = %position.id,
            tick_lower = position.tick_lower,
            tick_upper = position.tick_upper,
            "position: empty tick range, scoring 0"
        );
        return 0.0;
    }

    let sigma = sigma_for(position.fee_tier);
    let proximity = average_proximity(current_tick, position.tick_lower, position.tick_upper, sigma);
    let magnitude = liquidity_magnitude(position.liquidity);
    let score = proximity * magnitude;

    if !score.is_finite() {
        warn!(position = %position.id, proximity, magnitude, "position: non-finite score, scoring 0");
        return 0.0;
    }
    score
}

/// Raw scores for a set of positions, keyed by position id.
pub fn score_positions<'a, I>(positions: I) -> PositionScores
where
    I: IntoIterator<Item = &'a LiquidityPosition>,
{
    positions
        .into_iter()
        .map(|p| (p.id.clone(), score_position(p)))
        .collect()
}
