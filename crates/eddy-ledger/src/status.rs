//! Transaction status notifications and the submission state machine.

use eddy_core::error::LedgerError;
use serde::{Deserialize, Serialize};

/// Module-level error reported when an included call fails to dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchError {
    pub module: String,
    pub error: String,
    #[serde(default)]
    pub docs: String,
}

impl DispatchError {
    /// `module.error: docs`, or `module.error` without docs.
    pub fn reason(&self) -> String {
        if self.docs.is_empty() {
            format!("{}.{}", self.module, self.error)
        } else {
            format!("{}.{}: {}", self.module, self.error, self.docs)
        }
    }
}

/// One status notification on a submission subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TxStatus {
    Ready,
    Broadcast,
    #[serde(rename_all = "camelCase")]
    InBlock {
        block: String,
        #[serde(default)]
        dispatch_error: Option<DispatchError>,
    },
    #[serde(rename_all = "camelCase")]
    Finalized {
        block: String,
        #[serde(default)]
        dispatch_error: Option<DispatchError>,
    },
    Dropped,
    Invalid {
        reason: String,
    },
    Usurped,
}

/// Where a submission stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    Submitted,
    InBlock { block: String },
    Finalized { block: String },
    Failed(LedgerError),
}

impl SubmissionState {
    /// Apply one status notification. Terminal states never change.
    pub fn advance(self, status: &TxStatus) -> Self {
        if matches!(self, Self::Finalized { .. } | Self::Failed(_)) {
            return self;
        }
        match status {
            TxStatus::Ready | TxStatus::Broadcast => self,
            TxStatus::InBlock {
                dispatch_error: Some(e),
                ..
            }
            | TxStatus::Finalized {
                dispatch_error: Some(e),
                ..
            } => Self::Failed(LedgerError::Dispatch { reason: e.reason() }),
            TxStatus::InBlock { block, .. } => Self::InBlock {
                block: block.clone(),
            },
            TxStatus::Finalized { block, .. } => Self::Finalized {
                block: block.clone(),
            },
            TxStatus::Dropped => Self::Failed(LedgerError::Dropped),
            TxStatus::Invalid { reason } => Self::Failed(LedgerError::Invalid(reason.clone())),
            TxStatus::Usurped => Self::Failed(LedgerError::Invalid("usurped by another transaction".to_string())),
        }
    }

    /// Whether the submission is done, given the configured success state.
    pub fn is_terminal(&self, wait_for_finalization: bool) -> bool {
        match self {
            Self::Submitted => false,
            Self::InBlock { .. } => !wait_for_finalization,
            Self::Finalized { .. } | Self::Failed(_) => true,
        }
    }
}
