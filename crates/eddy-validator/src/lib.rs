//! # eddy-validator-lib: The validator's control loop.
//!
//! Wires the read-side sources, the scoring functions and the ledger together:
//!
//! - [`config`]: `EDDY_*` environment configuration
//! - [`context`]: long-lived state: EMA, response caches, error budget
//! - [`pipeline`]: one compute iteration, votes through smoothing
//! - [`submission`]: quantize, fall back to uniform, snapshot, submit
//! - [`snapshot`]: JSON record of every (would-be) submission
//! - [`scheduler`]: the two-cadence `tokio::select!` loop

pub mod config;
pub mod context;
pub mod pipeline;
pub mod scheduler;
pub mod snapshot;
pub mod submission;

pub use config::{SubmitCadence, ValidatorConfig};
pub use context::{CachedBalances, ErrorBudget, ValidatorContext};
pub use pipeline::{IterationReport, Sources, compute_iteration};
pub use scheduler::{Scheduler, SchedulerSettings};
pub use snapshot::{SnapshotError, WeightSnapshot};
pub use submission::{SubmissionOutcome, SubmitSettings, submit_weights};
