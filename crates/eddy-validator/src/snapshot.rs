//! JSON record of every submitted (or dry-run) weight vector.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use eddy_core::types::{MinerWeights, QuantizedWeights, Uid};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot io: {0}")] Io(#[from] std::io::Error),
    #[error("snapshot json: {0}")] Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub netuid: u16,
    pub block: u64,
    pub version_key: u64,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
    pub uids: Vec<Uid>,
    pub weights: Vec<u16>,
    /// Smoothed weights the quantized vector was derived from.
    pub float_weights: Vec<f64>,
    pub tx_hash: Option<String>,
}

impl WeightSnapshot {
    pub fn new(
        netuid: u16,
        block: u64,
        dry_run: bool,
        quantized: &QuantizedWeights,
        smoothed: &MinerWeights,
    ) -> Self {
        let uids: Vec<Uid> = quantized.keys().copied().collect();
        let float_weights = uids
            .iter()
            .map(|uid| smoothed.get(uid).copied().unwrap_or(0.0))
            .collect();
        Self {
            netuid,
            block,
            version_key: block,
            dry_run,
            created_at: Utc::now(),
            weights: quantized.values().copied().collect(),
            uids,
            float_weights,
            tx_hash: None,
        }
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    /// `weights-{block}-{timestamp}.json`.
    pub fn file_name(&self) -> String {
        format!(
            "weights-{}-{}.json",
            self.block,
            self.created_at.format("%Y%m%dT%H%M%S%.3fZ")
        )
    }

    /// Write into `dir`, creating it if needed. Returns the file path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, SnapshotError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self, SnapshotError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
