//! Quantize the smoothed weights and put them on the ledger.

use std::path::PathBuf;

use eddy_core::error::{LedgerError, PipelineError, QuantizeError};
use eddy_core::traits::WeightLedger;
use eddy_core::types::{MinerWeights, QuantizedWeights, SubmissionReceipt, Uid};
use eddy_scoring::{quantize, uniform_weights};
use tracing::{info, warn};

use crate::context::ValidatorContext;
use crate::snapshot::WeightSnapshot;

#[derive(Debug, Clone)]
pub struct SubmitSettings {
    pub netuid: u16,
    /// Quantize and snapshot without submitting.
    pub dry_run: bool,
    pub snapshots_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    /// Ledger height used as the version key.
    pub block: u64,
    pub weights: QuantizedWeights,
    /// Whether the uniform distribution replaced an empty EMA.
    pub uniform_fallback: bool,
    /// `None` in dry-run.
    pub receipt: Option<SubmissionReceipt>,
    pub snapshot: Option<PathBuf>,
}

/// Quantize `ctx.ema`, submit it at the current block height and record a
/// snapshot.
///
/// An EMA with no positive entry is replaced by a uniform distribution over
/// the whole subnet. `ctx.last_submitted_block` only moves on success.
pub async fn submit_weights(
    ledger: &dyn WeightLedger,
    ctx: &mut ValidatorContext,
    settings: &SubmitSettings,
) -> Result<SubmissionOutcome, PipelineError> {
    let block = ledger.block_height().await?;
    let (smoothed, uniform_fallback) = weights_to_submit(ledger, ctx).await?;
    let quantized = quantize(&smoothed).map_err(|e| PipelineError::Fatal(format!("quantize: {e}")))?;

    let uids: Vec<Uid> = quantized.keys().copied().collect();
    let weights: Vec<u16> = quantized.values().copied().collect();
    let snapshot = WeightSnapshot::new(settings.netuid, block, settings.dry_run, &quantized, &smoothed);

    let (receipt, snapshot) = if settings.dry_run {
        info!(block, uids = uids.len(), uniform_fallback, "submission: dry run, not submitting");
        (None, snapshot)
    } else {
        let receipt = ledger.set_weights(&uids, &weights, block).await.map_err(|e| match e {
            LedgerError::SigningKey(reason) => PipelineError::Fatal(format!("signing key: {reason}")),
            other => PipelineError::Ledger(other),
        })?;
        let snapshot = snapshot.with_tx_hash(receipt.tx_hash.clone());
        (Some(receipt), snapshot)
    };
    ctx.last_submitted_block = Some(block);

    let snapshot_path = match snapshot.write(&settings.snapshots_dir) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(block, dir = %settings.snapshots_dir.display(), error = %e, "submission: snapshot not written");
            None
        }
    };

    info!(
        block,
        uids = uids.len(),
        uniform_fallback,
        dry_run = settings.dry_run,
        tx_hash = receipt.as_ref().map(|r| r.tx_hash.as_str()).unwrap_or("-"),
        "submission: weights recorded"
    );
    Ok(SubmissionOutcome {
        block,
        weights: quantized,
        uniform_fallback,
        receipt,
        snapshot: snapshot_path,
    })
}

async fn weights_to_submit(
    ledger: &dyn WeightLedger,
    ctx: &ValidatorContext,
) -> Result<(MinerWeights, bool), PipelineError> {
    let smoothed = ctx.ema.positive_weights();
    match quantize(&smoothed) {
        Ok(_) => Ok((smoothed, false)),
        Err(QuantizeError::EmptyInput) => {
            let size = ledger
                .subnet_size()
                .await
                .map_err(|e| PipelineError::Fatal(format!("subnet size unavailable for uniform fallback: {e}")))?;
            if size == 0 {
                return Err(PipelineError::EmptyInput("subnet has no miner slots".to_string()));
            }
            warn!(subnet_size = size, "submission: no positive weights, falling back to uniform");
            Ok((uniform_weights(size), true))
        }
        Err(QuantizeError::ZeroTotal) => Err(PipelineError::Fatal("smoothed weights sum to zero".to_string())),
    }
}
