//! JSON-RPC interface of the ledger node.
//!
//! The macro generates `LedgerApiClient` (used by the submitter over a
//! WebSocket client) and `LedgerApiServer` (implemented by test doubles).

use jsonrpsee::core::SubscriptionResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;

use crate::status::TxStatus;

#[rpc(client, server)]
pub trait LedgerApi {
    /// Height of the best block.
    #[method(name = "chain_getBlockHeight")]
    async fn block_height(&self) -> Result<u64, ErrorObjectOwned>;

    /// Number of miner slots on subnet `netuid`.
    #[method(name = "subnet_getSize")]
    async fn subnet_size(&self, netuid: u16) -> Result<u16, ErrorObjectOwned>;

    /// Submit a hex-encoded signed weight call and stream its status.
    #[subscription(
        name = "author_submitAndWatchWeights" => "author_weightsStatus",
        unsubscribe = "author_unwatchWeights",
        item = TxStatus
    )]
    async fn submit_and_watch_weights(&self, signed_hex: String) -> SubscriptionResult;
}
