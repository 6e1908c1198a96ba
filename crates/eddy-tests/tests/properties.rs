//! Cross-crate properties of the scoring pipeline: whatever the votes and
//! positions look like, the submitted vector is exact and well-formed.

use eddy_core::constants::WEIGHT_TOTAL;
use eddy_core::types::{
    Balances, FeeTier, LiquidityPosition, MinerWeights, PositionsByMiner, VotePosition, VotesByVoter,
};
use eddy_ledger::SetWeightsCall;
use eddy_scoring::{EmaState, aggregate_pool_weights, quantize, score_miners, uniform_weights};
use eddy_tests::helpers::test_key;
use proptest::prelude::*;

const POOLS: [&str; 3] = [
    "0x000000000000000000000000000000000000000a",
    "0x000000000000000000000000000000000000000b",
    "0x000000000000000000000000000000000000000c",
];
const FEES: [u32; 5] = [100, 500, 3000, 10000, 2500];

fn votes_strategy() -> impl Strategy<Value = (VotesByVoter, Balances)> {
    prop::collection::vec((0usize..3, 0u16..=10000, 0.0f64..1e6), 1..12).prop_map(|raw| {
        let mut votes = VotesByVoter::new();
        let mut balances = Balances::new();
        for (i, (pool, weight, balance)) in raw.into_iter().enumerate() {
            let voter = format!("0x{:040x}", i + 1);
            votes.entry(voter.clone()).or_default().push(VotePosition {
                voter: voter.clone(),
                pool: POOLS[pool].to_string(),
                weight,
            });
            balances.insert(voter, balance);
        }
        (votes, balances)
    })
}

fn positions_strategy() -> impl Strategy<Value = PositionsByMiner> {
    prop::collection::vec(
        (0u16..16, 0usize..3, 0usize..5, -5_000i32..5_000, -4_000i32..4_000, 1i32..4_000, 0u128..u128::from(u64::MAX)),
        0..40,
    )
    .prop_map(|raw| {
        let mut by_miner = PositionsByMiner::new();
        for (i, (uid, pool, fee, current, lower, width, liquidity)) in raw.into_iter().enumerate() {
            by_miner.entry(uid).or_default().push(LiquidityPosition {
                id: format!("p{i}"),
                owner: format!("0x{:040x}", u32::from(uid) + 100),
                pool_id: POOLS[pool].to_string(),
                fee_tier: FeeTier::from_raw(FEES[fee]),
                current_tick: Some(current),
                tick_lower: lower,
                tick_upper: lower + width,
                liquidity,
            });
        }
        by_miner
    })
}

fn total(weights: &MinerWeights) -> f64 {
    weights.values().sum()
}

proptest! {
    #[test]
    fn miner_weights_are_a_distribution((votes, balances) in votes_strategy(), positions in positions_strategy()) {
        let pools = aggregate_pool_weights(&votes, &balances);
        let miners = score_miners(&positions, &pools);
        prop_assert!(miners.values().all(|w| w.is_finite() && *w >= 0.0));
        let sum = total(&miners);
        prop_assert!(sum == 0.0 || (sum - 1.0).abs() < 1e-9, "sum {}", sum);
        prop_assert!(miners.keys().all(|uid| positions.contains_key(uid)));
    }

    #[test]
    fn smoothed_vector_always_quantizes_exactly(
        rounds in prop::collection::vec((votes_strategy(), positions_strategy()), 1..5),
        alpha in 0.01f64..0.99,
    ) {
        let mut ema = EmaState::new(alpha);
        for ((votes, balances), positions) in rounds {
            let pools = aggregate_pool_weights(&votes, &balances);
            ema.update(&score_miners(&positions, &pools));
        }
        let positive = ema.positive_weights();
        let submitted = if positive.is_empty() { uniform_weights(16) } else { positive };
        let quantized = quantize(&submitted).unwrap();
        let sum: u32 = quantized.values().map(|w| u32::from(*w)).sum();
        prop_assert_eq!(sum, u32::from(WEIGHT_TOTAL));

        let uids: Vec<u16> = quantized.keys().copied().collect();
        let weights: Vec<u16> = quantized.values().copied().collect();
        let signed = SetWeightsCall::new(1, &uids, &weights, 7).unwrap().sign(&test_key()).unwrap();
        prop_assert!(signed.verify().is_ok());
    }
}
