//! Fixed-point quantization of smoothed weights for ledger submission.
//!
//! The ledger takes u16 weights that must sum to exactly [`WEIGHT_TOTAL`].
//! Quantization runs in three stages:
//!
//! 1. Normalize the float weights by their sum and round each `w × 65535`.
//! 2. If the rounded sum is off, rescale every entry by `65535 / sum` and
//!    round again.
//! 3. Settle whatever that second rounding left over with a largest-remainder
//!    pass, moving single units one entry at a time.

use std::cmp::Ordering;

use eddy_core::constants::WEIGHT_TOTAL;
use eddy_core::error::QuantizeError;
use eddy_core::types::{MinerWeights, QuantizedWeights, Uid};
use tracing::debug;

/// Quantize `weights` to u16 values summing to exactly 65535.
///
/// Negative and non-finite inputs count as 0 and always quantize to 0.
pub fn quantize(weights: &MinerWeights) -> Result<QuantizedWeights, QuantizeError> {
    if weights.is_empty() {
        return Err(QuantizeError::EmptyInput);
    }

    let cleaned: Vec<(Uid, f64)> = weights
        .iter()
        .map(|(uid, w)| (*uid, if w.is_finite() && *w > 0.0 { *w } else { 0.0 }))
        .collect();
    let total: f64 = cleaned.iter().map(|(_, w)| w).sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(QuantizeError::ZeroTotal);
    }

    let target = f64::from(WEIGHT_TOTAL);
    let scaled: Vec<f64> = cleaned.iter().map(|(_, w)| w / total * target).collect();
    let first: Vec<u64> = scaled.iter().map(|v| v.round() as u64).collect();
    let first_sum: u64 = first.iter().sum();

    if first_sum == u64::from(WEIGHT_TOTAL) {
        return Ok(collect(&cleaned, &first));
    }
    debug!(first_sum, "quantize: rounded sum off target, rescaling");

    // Second pass targets, measured from the first rounding when it is usable.
    let exact: Vec<f64> = if first_sum > 0 {
        let factor = target / first_sum as f64;
        first.iter().map(|q| *q as f64 * factor).collect()
    } else {
        scaled
    };
    let mut rounded: Vec<u64> = exact.iter().map(|v| v.round() as u64).collect();

    settle(&cleaned, &exact, &mut rounded);
    Ok(collect(&cleaned, &rounded))
}

/// Largest-remainder correction: move ±1 units until the sum is exact.
///
/// Increments go to entries rounded down the most, decrements to entries
/// rounded up the most, ties broken by ascending uid. Zero-weight entries are
/// never incremented.
fn settle(cleaned: &[(Uid, f64)], exact: &[f64], rounded: &mut [u64]) {
    let target = i64::from(WEIGHT_TOTAL);
    let mut diff = target - rounded.iter().sum::<u64>() as i64;
    if diff == 0 {
        return;
    }

    let mut order: Vec<usize> = (0..rounded.len()).collect();
    let remainder = |i: usize| exact[i] - rounded[i] as f64;
    let by_remainder = |a: &usize, b: &usize, sign: f64| {
        (sign * remainder(*b))
            .partial_cmp(&(sign * remainder(*a)))
            .unwrap_or(Ordering::Equal)
            .then(cleaned[*a].0.cmp(&cleaned[*b].0))
    };
    let sign = if diff > 0 { 1.0 } else { -1.0 };
    order.sort_by(|a, b| by_remainder(a, b, sign));

    debug!(diff, "quantize: settling residual");
    while diff != 0 {
        let mut moved = false;
        for &i in &order {
            if diff == 0 {
                break;
            }
            if diff > 0 && cleaned[i].1 > 0.0 && rounded[i] < u64::from(WEIGHT_TOTAL) {
                rounded[i] += 1;
                diff -= 1;
                moved = true;
            } else if diff < 0 && rounded[i] > 0 {
                rounded[i] -= 1;
                diff += 1;
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }
}

fn collect(cleaned: &[(Uid, f64)], values: &[u64]) -> QuantizedWeights {
    cleaned
        .iter()
        .zip(values)
        .map(|((uid, _), v)| (*uid, (*v).min(u64::from(WEIGHT_TOTAL)) as u16))
        .collect()
}

/// Equal weight for every uid in `0..subnet_size`.
pub fn uniform_weights(subnet_size: u16) -> MinerWeights {
    if subnet_size == 0 {
        return MinerWeights::new();
    }
    let share = 1.0 / f64::from(subnet_size);
    (0..subnet_size).map(|uid| (uid, share)).collect()
}
