//! # eddy-core
//! Foundation types, error taxonomy, and data-source traits shared by every
//! Eddy crate.

pub mod address;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    AddressError, ConfigError, FetchError, LedgerError, PipelineError, QuantizeError,
};
pub use types::{
    Balances, FeeTier, LiquidityPosition, MinerEntry, MinerRegistry, MinerWeights, PoolWeights,
    PositionScores, PositionsByMiner, QuantizedWeights, SubmissionReceipt, Uid, VotePosition,
    VotesByVoter,
};
