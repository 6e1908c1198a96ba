//! Miner weights from normalized position scores and pool weights.

use eddy_core::constants::MINER_DUST_THRESHOLD;
use eddy_core::types::{MinerWeights, PoolWeights, PositionScores, PositionsByMiner};
use tracing::debug;

use crate::normalize::normalize_pool_scores;
use crate::position::score_positions;

/// Sum `normalized_score × pool_weight` over each miner's positions.
///
/// Weights at or below [`MINER_DUST_THRESHOLD`] are zeroed and the rest are
/// renormalized to 1. When nothing survives every miner keeps 0. Every miner
/// in `positions_by_miner` appears in the output.
pub fn aggregate_miner_weights(
    positions_by_miner: &PositionsByMiner,
    normalized_scores: &PositionScores,
    pool_weights: &PoolWeights,
) -> MinerWeights {
    let mut weights: MinerWeights = positions_by_miner
        .iter()
        .map(|(uid, positions)| {
            let total: f64 = positions
                .iter()
                .map(|p| {
                    let score = normalized_scores.get(&p.id).copied().unwrap_or(0.0);
                    let pool = pool_weights.get(&p.pool_id).copied().unwrap_or(0.0);
                    score * pool
                })
                .filter(|v| v.is_finite())
                .sum();
            (*uid, total)
        })
        .collect();

    for (uid, weight) in weights.iter_mut() {
        if *weight <= MINER_DUST_THRESHOLD {
            if *weight > 0.0 {
                debug!(uid, weight = *weight, "miner_weight: below dust threshold, zeroed");
            }
            *weight = 0.0;
        }
    }

    let sum: f64 = weights.values().sum();
    if sum > 0.0 {
        for weight in weights.values_mut() {
            *weight /= sum;
        }
    }
    weights
}

/// Score, normalize and aggregate in one pass.
pub fn score_miners(positions_by_miner: &PositionsByMiner, pool_weights: &PoolWeights) -> MinerWeights {
    let all = || positions_by_miner.values().flatten();
    let raw = score_positions(all());
    let normalized = normalize_pool_scores(all(), &raw);
    aggregate_miner_weights(positions_by_miner, &normalized, pool_weights)
}
