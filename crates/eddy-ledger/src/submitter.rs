//! [`WeightLedger`] over the ledger's JSON-RPC WebSocket API.

use std::time::Duration;

use async_trait::async_trait;
use eddy_core::constants::SUBMIT_TIMEOUT;
use eddy_core::error::LedgerError;
use eddy_core::traits::WeightLedger;
use eddy_core::types::{SubmissionReceipt, Uid};
use futures::StreamExt;
use jsonrpsee::core::ClientError;
use tracing::{debug, info, warn};

use crate::api::LedgerApiClient;
use crate::call::SetWeightsCall;
use crate::connection::LedgerConnection;
use crate::keys::ValidatorKey;
use crate::status::SubmissionState;

/// Map a jsonrpsee client failure onto the ledger error taxonomy.
pub fn map_client_error(err: ClientError) -> LedgerError {
    match err {
        ClientError::RestartNeeded(_) => LedgerError::Disconnected,
        ClientError::Call(obj) => LedgerError::Rpc(obj.message().to_string()),
        other => LedgerError::Rpc(other.to_string()),
    }
}

pub struct LedgerSubmitter {
    connection: LedgerConnection,
    key: Option<ValidatorKey>,
    netuid: u16,
    wait_for_finalization: bool,
    submit_timeout: Duration,
}

impl LedgerSubmitter {
    /// Without a key the submitter can still answer queries but refuses to
    /// submit.
    pub fn new(connection: LedgerConnection, key: Option<ValidatorKey>, netuid: u16) -> Self {
        Self {
            connection,
            key,
            netuid,
            wait_for_finalization: false,
            submit_timeout: SUBMIT_TIMEOUT,
        }
    }

    pub fn with_finalization(mut self, wait_for_finalization: bool) -> Self {
        self.wait_for_finalization = wait_for_finalization;
        self
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn netuid(&self) -> u16 {
        self.netuid
    }

    /// One submission attempt: subscribe and drive the state machine until a
    /// terminal state, the stream ends, or the deadline passes.
    async fn submit_once(&self, signed_hex: &str, tx_hash: &str) -> Result<SubmissionReceipt, LedgerError> {
        let client = self.connection.client().await?;
        let mut statuses = client
            .submit_and_watch_weights(signed_hex.to_string())
            .await
            .map_err(map_client_error)?;

        let wait_for_finalization = self.wait_for_finalization;
        let drive = async {
            let mut state = SubmissionState::Submitted;
            while let Some(item) = statuses.next().await {
                let status = item.map_err(|e| LedgerError::Rpc(format!("status notification: {e}")))?;
                debug!(%tx_hash, ?status, "ledger: status update");
                state = state.advance(&status);
                if state.is_terminal(wait_for_finalization) {
                    return Ok::<_, LedgerError>(state);
                }
            }
            if client.is_connected() {
                Err(LedgerError::StreamClosed)
            } else {
                Err(LedgerError::Disconnected)
            }
        };

        let state = tokio::time::timeout(self.submit_timeout, drive)
            .await
            .map_err(|_| LedgerError::Timeout {
                secs: self.submit_timeout.as_secs(),
            })??;

        match state {
            SubmissionState::InBlock { block } => Ok(SubmissionReceipt {
                tx_hash: tx_hash.to_string(),
                block_hash: block,
                finalized: false,
            }),
            SubmissionState::Finalized { block } => Ok(SubmissionReceipt {
                tx_hash: tx_hash.to_string(),
                block_hash: block,
                finalized: true,
            }),
            SubmissionState::Failed(err) => Err(err),
            SubmissionState::Submitted => Err(LedgerError::StreamClosed),
        }
    }
}

#[async_trait]
impl WeightLedger for LedgerSubmitter {
    async fn block_height(&self) -> Result<u64, LedgerError> {
        let client = self.connection.client().await?;
        client.block_height().await.map_err(map_client_error)
    }

    async fn subnet_size(&self) -> Result<u16, LedgerError> {
        let client = self.connection.client().await?;
        client.subnet_size(self.netuid).await.map_err(map_client_error)
    }

    async fn set_weights(
        &self,
        uids: &[Uid],
        weights: &[u16],
        version_key: u64,
    ) -> Result<SubmissionReceipt, LedgerError> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| LedgerError::SigningKey("no signing key configured".to_string()))?;
        let signed = SetWeightsCall::new(self.netuid, uids, weights, version_key)?.sign(key)?;
        let signed_hex = signed.to_hex()?;
        let tx_hash = signed.tx_hash()?;
        info!(%tx_hash, netuid = self.netuid, uids = uids.len(), version_key, "ledger: submitting weights");

        let receipt = match self.submit_once(&signed_hex, &tx_hash).await {
            Err(LedgerError::Disconnected) => {
                warn!(%tx_hash, "ledger: disconnected during submission, retrying once");
                self.submit_once(&signed_hex, &tx_hash).await
            }
            other => other,
        }?;

        info!(
            %tx_hash,
            block = %receipt.block_hash,
            finalized = receipt.finalized,
            "ledger: weights included"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::types::ErrorObjectOwned;

    #[test]
    fn call_errors_keep_message() {
        let err = ClientError::Call(ErrorObjectOwned::owned(-32000, "subnet unknown", None::<()>));
        assert_eq!(map_client_error(err), LedgerError::Rpc("subnet unknown".into()));
    }

    #[test]
    fn other_errors_are_rpc() {
        let err = map_client_error(ClientError::RequestTimeout);
        assert!(matches!(err, LedgerError::Rpc(_)));
    }
}
