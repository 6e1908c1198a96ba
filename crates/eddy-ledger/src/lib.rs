//! # eddy-ledger: Getting a weight vector onto the ledger.
//!
//! - [`api`]: the ledger's JSON-RPC surface (client and server halves)
//! - [`keys`]: the validator's ed25519 signing key
//! - [`call`]: the weight-setting call, its signed envelope and tx hash
//! - [`status`]: transaction status notifications and the submission state
//!   machine `Submitted → InBlock → Finalized | Failed`
//! - [`connection`]: long-lived WebSocket connection with a reconnecting
//!   watcher task
//! - [`submitter`]: [`LedgerSubmitter`], the `WeightLedger` implementation

pub mod api;
pub mod call;
pub mod connection;
pub mod keys;
pub mod status;
pub mod submitter;

pub use call::{DOMAIN_TAG, SetWeightsCall, SignedCall};
pub use connection::LedgerConnection;
pub use keys::ValidatorKey;
pub use status::{DispatchError, SubmissionState, TxStatus};
pub use submitter::LedgerSubmitter;
