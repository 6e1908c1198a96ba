//! Trait interfaces between the pipeline and its external collaborators.
//!
//! - [`VoteSource`], [`BalanceSource`], [`RegistrySource`], [`PositionSource`]
//!   are read-only query endpoints (eddy-fetch implements)
//! - [`WeightLedger`]: the ledger the weight vector is submitted to
//!   (eddy-ledger implements)
//!
//! The scheduler only sees these traits, so every stage can be replaced by an
//! in-memory double in tests.

use async_trait::async_trait;

use crate::error::{FetchError, LedgerError};
use crate::types::{
    Balances, MinerRegistry, PositionsByMiner, SubmissionReceipt, Uid, VotesByVoter,
};

/// Current governance votes from the indexer.
#[async_trait]
pub trait VoteSource: Send + Sync {
    /// All current vote records, grouped by voter.
    async fn fetch_votes(&self) -> Result<VotesByVoter, FetchError>;
}

/// Token balances of voters.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Balances for `addresses` (canonical form). Unknown addresses are absent.
    async fn fetch_balances(&self, addresses: &[String]) -> Result<Balances, FetchError>;
}

/// Miner index ↔ hotkey ↔ linked address mapping.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn fetch_registry(&self) -> Result<MinerRegistry, FetchError>;
}

/// Concentrated-liquidity positions of linked miners.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Positions in `target_pools` owned by the registry's linked addresses.
    ///
    /// Every linked miner appears in the result, with an empty list when it
    /// holds nothing in the target pools.
    async fn fetch_positions(
        &self,
        registry: &MinerRegistry,
        target_pools: &[String],
    ) -> Result<PositionsByMiner, FetchError>;
}

/// The ledger that accepts weight-setting transactions.
#[async_trait]
pub trait WeightLedger: Send + Sync {
    /// Current block height, used as the submission version key.
    async fn block_height(&self) -> Result<u64, LedgerError>;

    /// Number of miner slots on the subnet.
    async fn subnet_size(&self) -> Result<u16, LedgerError>;

    /// Sign and submit a weight vector, waiting for inclusion.
    async fn set_weights(
        &self,
        uids: &[Uid],
        weights: &[u16],
        version_key: u64,
    ) -> Result<SubmissionReceipt, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // ------------------------------------------------------------------
    // Mock: WeightLedger
    // ------------------------------------------------------------------

    struct MockLedger {
        height: u64,
        size: u16,
        submitted: Mutex<Vec<(Vec<Uid>, Vec<u16>, u64)>>,
    }

    #[async_trait]
    impl WeightLedger for MockLedger {
        async fn block_height(&self) -> Result<u64, LedgerError> {
            Ok(self.height)
        }

        async fn subnet_size(&self) -> Result<u16, LedgerError> {
            Ok(self.size)
        }

        async fn set_weights(
            &self,
            uids: &[Uid],
            weights: &[u16],
            version_key: u64,
        ) -> Result<SubmissionReceipt, LedgerError> {
            if uids.len() != weights.len() {
                return Err(LedgerError::LengthMismatch {
                    uids: uids.len(),
                    weights: weights.len(),
                });
            }
            self.submitted
                .lock()
                .unwrap()
                .push((uids.to_vec(), weights.to_vec(), version_key));
            Ok(SubmissionReceipt {
                tx_hash: "00".repeat(32),
                block_hash: "11".repeat(32),
                finalized: false,
            })
        }
    }

    #[tokio::test]
    async fn ledger_trait_object_records_submission() {
        let ledger = MockLedger {
            height: 42,
            size: 4,
            submitted: Mutex::new(Vec::new()),
        };
        let dyn_ledger: &dyn WeightLedger = &ledger;
        let version = dyn_ledger.block_height().await.unwrap();
        dyn_ledger
            .set_weights(&[0, 1], &[30000, 35535], version)
            .await
            .unwrap();
        let submitted = ledger.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].2, 42);
    }

    #[tokio::test]
    async fn ledger_trait_rejects_length_mismatch() {
        let ledger = MockLedger {
            height: 1,
            size: 1,
            submitted: Mutex::new(Vec::new()),
        };
        let err = ledger.set_weights(&[0, 1], &[65535], 1).await.unwrap_err();
        assert_eq!(err, LedgerError::LengthMismatch { uids: 2, weights: 1 });
    }
}
