//! Core data types flowing through the scoring pipeline.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Miner index on the ledger's subnet.
pub type Uid = u16;

/// One voter's allocation to one pool, in basis points of the voter's total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VotePosition {
    pub voter: String,
    pub pool: String,
    pub weight: u16,
}

/// Vote positions grouped by canonical voter key.
pub type VotesByVoter = HashMap<String, Vec<VotePosition>>;

/// Token balance per canonical voter address. Absent means zero.
pub type Balances = HashMap<String, f64>;

/// Normalized share of total voting power per pool.
pub type PoolWeights = BTreeMap<String, f64>;

/// Score per position id.
pub type PositionScores = HashMap<String, f64>;

/// Weight per miner uid.
pub type MinerWeights = BTreeMap<Uid, f64>;

/// Fixed-point weight per miner uid, summing to [`WEIGHT_TOTAL`](crate::constants::WEIGHT_TOTAL).
pub type QuantizedWeights = BTreeMap<Uid, u16>;

/// Liquidity positions held by each linked miner.
pub type PositionsByMiner = BTreeMap<Uid, Vec<LiquidityPosition>>;

/// Pool fee tier in hundredths of a basis point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeTier {
    /// 0.01%, stable pairs.
    Lowest,
    /// 0.05%.
    Low,
    /// 0.3%.
    Medium,
    /// 1%, exotic pairs.
    High,
    /// Any tier the scorer has no dedicated bucket for.
    Other(u32),
}

impl FeeTier {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            100 => Self::Lowest,
            500 => Self::Low,
            3000 => Self::Medium,
            10000 => Self::High,
            other => Self::Other(other),
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            Self::Lowest => 100,
            Self::Low => 500,
            Self::Medium => 3000,
            Self::High => 10000,
            Self::Other(raw) => *raw,
        }
    }
}

impl fmt::Display for FeeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw())
    }
}

/// Snapshot of one concentrated-liquidity position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPosition {
    pub id: String,
    pub owner: String,
    pub pool_id: String,
    pub fee_tier: FeeTier,
    /// Pool's current tick; `None` when the pool reported no price.
    pub current_tick: Option<i32>,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
}

/// One registered miner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerEntry {
    pub uid: Uid,
    pub hotkey: String,
    /// Canonical settlement-chain address linked to this hotkey, if any.
    pub linked_address: Option<String>,
}

/// Ordered miner registry with an owner address → uid lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinerRegistry {
    entries: Vec<MinerEntry>,
    owners: HashMap<String, Uid>,
}

impl MinerRegistry {
    /// Build the registry. When several miners link the same address the
    /// lowest uid keeps it.
    pub fn new(mut entries: Vec<MinerEntry>) -> Self {
        entries.sort_by_key(|e| e.uid);
        let mut owners = HashMap::new();
        for entry in &entries {
            if let Some(addr) = &entry.linked_address {
                owners.entry(addr.clone()).or_insert(entry.uid);
            }
        }
        Self { entries, owners }
    }

    pub fn entries(&self) -> &[MinerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Uid owning `address` (canonical form).
    pub fn uid_for_owner(&self, address: &str) -> Option<Uid> {
        self.owners.get(address).copied()
    }

    /// Distinct linked owner addresses, sorted.
    pub fn linked_owners(&self) -> Vec<String> {
        let mut owners: Vec<String> = self.owners.keys().cloned().collect();
        owners.sort();
        owners
    }

    /// Uids that hold the claim on a linked address.
    pub fn linked_uids(&self) -> Vec<Uid> {
        let mut uids: Vec<Uid> = self.owners.values().copied().collect();
        uids.sort_unstable();
        uids
    }
}

/// Proof that a weight submission reached the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Hex hash of the signed payload.
    pub tx_hash: String,
    /// Hash of the block that included it.
    pub block_hash: String,
    /// Whether the including block was finalized.
    pub finalized: bool,
}
