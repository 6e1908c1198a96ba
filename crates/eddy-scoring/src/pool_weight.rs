//! Balance-weighted pool weights from governance votes.
//!
//! Each voter owns `balance` units of voting power and splits it across the
//! pools they voted for in proportion to their own vote weights. A voter with
//! `{X: 7000, Y: 3000}` and balance 100 therefore contributes 70 to X and 30 to
//! Y, not 100 to each. The per-pool totals are then normalized to sum to 1.

use std::collections::BTreeMap;

use eddy_core::types::{Balances, PoolWeights, VotesByVoter};
use tracing::debug;

/// Aggregate votes and balances into normalized pool weights.
///
/// Voters without a positive balance, without votes, or whose vote weights sum
/// to zero are skipped. Returns an empty map when nothing contributes.
pub fn aggregate_pool_weights(votes: &VotesByVoter, balances: &Balances) -> PoolWeights {
    let mut accumulator: BTreeMap<String, f64> = BTreeMap::new();

    // Sorted iteration keeps float summation order stable across runs.
    let mut voters: Vec<&String> = votes.keys().collect();
    voters.sort();

    for voter in voters {
        let positions = &votes[voter];
        let balance = balances.get(voter).copied().unwrap_or(0.0);
        if positions.is_empty() || !balance.is_finite() || balance <= 0.0 {
            continue;
        }

        let total: f64 = positions.iter().map(|p| f64::from(p.weight)).sum();
        if total <= 0.0 {
            debug!(%voter, "pool_weight: voter has zero total vote weight, skipping");
            continue;
        }

        for position in positions {
            if position.weight == 0 {
                continue;
            }
            let share = f64::from(position.weight) / total * balance;
            *accumulator.entry(position.pool.clone()).or_insert(0.0) += share;
        }
    }

    let sum: f64 = accumulator.values().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return PoolWeights::new();
    }

    accumulator
        .into_iter()
        .map(|(pool, value)| (pool, value / sum))
        .collect()
}
