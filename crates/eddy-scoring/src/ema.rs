//! Exponential moving average of miner weights across iterations.
//!
//! `next[k] = α·current[k] + (1−α)·previous[k]` over the union of keys, with
//! absent entries read as 0. A miner that stops appearing decays geometrically
//! toward 0; there is no other decay.

use eddy_core::types::{MinerWeights, Uid};
use tracing::warn;

/// One EMA step.
pub fn ema_update(previous: &MinerWeights, current: &MinerWeights, alpha: f64) -> MinerWeights {
    let mut next = MinerWeights::new();
    for uid in previous.keys().chain(current.keys()) {
        if next.contains_key(uid) {
            continue;
        }
        let prev = previous.get(uid).copied().unwrap_or(0.0);
        let cur = current.get(uid).copied().unwrap_or(0.0);
        let mut value = alpha * cur + (1.0 - alpha) * prev;
        if !value.is_finite() {
            warn!(uid, prev, cur, "ema: non-finite value, clamping to 0");
            value = 0.0;
        }
        next.insert(*uid, value);
    }
    next
}

/// Long-lived smoothed weights, owned by the scheduler context.
#[derive(Debug, Clone)]
pub struct EmaState {
    alpha: f64,
    values: MinerWeights,
}

impl EmaState {
    /// Empty state. `alpha` is validated by the caller's config.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            values: MinerWeights::new(),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Fold one iteration's raw weights into the state.
    pub fn update(&mut self, current: &MinerWeights) {
        self.values = ema_update(&self.values, current, self.alpha);
    }

    pub fn values(&self) -> &MinerWeights {
        &self.values
    }

    pub fn get(&self, uid: Uid) -> f64 {
        self.values.get(&uid).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries with a strictly positive smoothed weight.
    pub fn positive_weights(&self) -> MinerWeights {
        self.values
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(uid, w)| (*uid, *w))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_step_blends() {
        let prev: MinerWeights = [(0, 1.0)].into();
        let cur: MinerWeights = [(0, 0.0), (1, 1.0)].into();
        let next = ema_update(&prev, &cur, 0.25);
        assert!((next[&0] - 0.75).abs() < 1e-15);
        assert!((next[&1] - 0.25).abs() < 1e-15);
    }

    #[test]
    fn absent_miner_decays_geometrically() {
        let mut state = EmaState::new(0.5);
        state.update(&[(3, 1.0)].into());
        assert_eq!(state.get(3), 0.5);
        state.update(&MinerWeights::new());
        assert_eq!(state.get(3), 0.25);
        state.update(&MinerWeights::new());
        assert_eq!(state.get(3), 0.125);
    }

    #[test]
    fn non_finite_clamped() {
        let prev: MinerWeights = [(0, f64::INFINITY)].into();
        let cur: MinerWeights = [(0, 1.0)].into();
        let next = ema_update(&prev, &cur, 0.1);
        assert_eq!(next[&0], 0.0);

        let nan: MinerWeights = [(1, f64::NAN)].into();
        assert_eq!(ema_update(&MinerWeights::new(), &nan, 0.1)[&1], 0.0);
    }

    #[test]
    fn convergence_matches_closed_form() {
        let w = 0.6;
        for alpha in [0.05, 0.1, 0.3, 0.9] {
            let mut state = EmaState::new(alpha);
            let current: MinerWeights = [(1, w)].into();
            for n in 1..=50 {
                state.update(&current);
                let expected = w * (1.0 - (1.0 - alpha).powi(n));
                assert!(
                    (state.get(1) - expected).abs() < 1e-12,
                    "alpha={alpha} n={n} got={} expected={expected}",
                    state.get(1)
                );
            }
        }
    }

    #[test]
    fn positive_weights_filters_zero() {
        let mut state = EmaState::new(0.5);
        state.update(&[(0, 0.0), (1, 0.4)].into());
        let positive = state.positive_weights();
        assert_eq!(positive.len(), 1);
        assert_eq!(positive[&1], 0.2);
        assert_eq!(state.values().len(), 2);
    }

    proptest! {
        #[test]
        fn stays_in_unit_interval(
            alpha in 0.001f64..0.999,
            rounds in prop::collection::vec(prop::collection::btree_map(0u16..8, 0.0f64..=1.0, 0..8), 1..20),
        ) {
            let mut state = EmaState::new(alpha);
            for round in &rounds {
                state.update(round);
                for w in state.values().values() {
                    prop_assert!((0.0..=1.0 + 1e-12).contains(w));
                }
            }
        }
    }
}
