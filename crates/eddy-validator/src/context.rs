//! Long-lived state owned by the scheduler.

use std::collections::BTreeSet;
use std::time::Duration;

use eddy_core::error::PipelineError;
use eddy_core::types::{Balances, VotesByVoter};
use eddy_fetch::TtlCache;
use eddy_scoring::EmaState;

/// Consecutive-failure counter that trips when the count reaches its limit:
/// a limit of 5 allows four failures in a row and fails on the fifth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBudget {
    limit: u32,
    consecutive: u32,
}

impl ErrorBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: 0,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Count one failure. Errors once the limit is reached.
    pub fn record_failure(&mut self) -> Result<(), PipelineError> {
        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive >= self.limit {
            return Err(PipelineError::ErrorBudgetExhausted {
                errors: self.consecutive,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

/// Balances cached together with the address set they were fetched for.
#[derive(Debug, Clone, Default)]
pub struct CachedBalances {
    pub requested: BTreeSet<String>,
    pub balances: Balances,
}

impl CachedBalances {
    /// Whether this entry answers a query for `addresses`.
    pub fn covers(&self, addresses: &[String]) -> bool {
        addresses.iter().all(|a| self.requested.contains(a))
    }

    /// Balances restricted to `addresses`.
    pub fn project(&self, addresses: &[String]) -> Balances {
        addresses
            .iter()
            .filter_map(|a| self.balances.get(a).map(|b| (a.clone(), *b)))
            .collect()
    }
}

pub struct ValidatorContext {
    pub ema: EmaState,
    pub votes: TtlCache<VotesByVoter>,
    pub balances: TtlCache<CachedBalances>,
    /// Failures of the compute cadence; reset by a successful iteration.
    pub compute_errors: ErrorBudget,
    /// Failures of the submission cadence; reset only by a successful
    /// submission, so successful computes cannot hide a stuck ledger.
    pub submit_errors: ErrorBudget,
    /// Block height of the last successful submission.
    pub last_submitted_block: Option<u64>,
    /// Completed compute iterations since start.
    pub iterations: u64,
}

impl ValidatorContext {
    pub fn new(ema_alpha: f64, cache_ttl: Duration, max_consecutive_errors: u32) -> Self {
        Self {
            ema: EmaState::new(ema_alpha),
            votes: TtlCache::new(cache_ttl),
            balances: TtlCache::new(cache_ttl),
            compute_errors: ErrorBudget::new(max_consecutive_errors),
            submit_errors: ErrorBudget::new(max_consecutive_errors),
            last_submitted_block: None,
            iterations: 0,
        }
    }

    /// Whether the block cadence calls for a submission at `height`.
    ///
    /// With no prior submission, the first computed EMA is submitted as soon
    /// as it exists.
    pub fn submission_due(&self, height: u64, interval_blocks: u64) -> bool {
        if self.iterations == 0 {
            return false;
        }
        match self.last_submitted_block {
            None => true,
            Some(last) => height.saturating_sub(last) >= interval_blocks,
        }
    }
}
