//! Per-pool normalization of raw position scores.

use std::collections::HashMap;

use eddy_core::types::{LiquidityPosition, PositionScores};

/// Divide each position's raw score by its pool's total.
///
/// Scores within a pool sum to 1, or are all 0 when the pool's raw total is
/// 0. Positions missing from `raw_scores` count as 0.
pub fn normalize_pool_scores<'a, I>(positions: I, raw_scores: &PositionScores) -> PositionScores
where
    I: IntoIterator<Item = &'a LiquidityPosition>,
{
    let positions: Vec<&LiquidityPosition> = positions.into_iter().collect();
    let raw = |p: &LiquidityPosition| {
        raw_scores
            .get(&p.id)
            .copied()
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(0.0)
    };

    let mut pool_totals: HashMap<&str, f64> = HashMap::new();
    for p in &positions {
        *pool_totals.entry(p.pool_id.as_str()).or_insert(0.0) += raw(p);
    }

    positions
        .iter()
        .map(|p| {
            let total = pool_totals.get(p.pool_id.as_str()).copied().unwrap_or(0.0);
            let normalized = if total > 0.0 { raw(p) / total } else { 0.0 };
            (p.id.clone(), normalized)
        })
        .collect()
}
