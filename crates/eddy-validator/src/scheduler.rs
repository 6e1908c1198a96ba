//! The validator's control loop.
//!
//! Compute and submission are two arms of one `tokio::select!`, so they never
//! overlap. Each cadence keeps its own error budget, so a healthy compute arm
//! never masks a failing ledger. The loop ends on shutdown or when either
//! budget is exhausted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use eddy_core::error::PipelineError;
use eddy_core::traits::WeightLedger;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::{debug, error, info};

use crate::config::{SubmitCadence, ValidatorConfig};
use crate::context::ValidatorContext;
use crate::pipeline::{Sources, compute_iteration};
use crate::submission::{SubmissionOutcome, SubmitSettings, submit_weights};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub compute_interval: Duration,
    pub cadence: SubmitCadence,
    pub block_poll_interval: Duration,
    pub submit: SubmitSettings,
}

impl SchedulerSettings {
    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self {
            compute_interval: config.compute_interval,
            cadence: config.submit_cadence,
            block_poll_interval: config.block_poll_interval,
            submit: SubmitSettings {
                netuid: config.netuid,
                dry_run: config.dry_run,
                snapshots_dir: config.snapshots_dir(),
            },
        }
    }
}

pub struct Scheduler {
    sources: Sources,
    ledger: Arc<dyn WeightLedger>,
    ctx: ValidatorContext,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(
        sources: Sources,
        ledger: Arc<dyn WeightLedger>,
        ctx: ValidatorContext,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            sources,
            ledger,
            ctx,
            settings,
        }
    }

    pub fn context(&self) -> &ValidatorContext {
        &self.ctx
    }

    pub fn into_context(self) -> ValidatorContext {
        self.ctx
    }

    /// Run until `shutdown` resolves (`Ok`) or the error budget runs out.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), PipelineError>
    where
        F: Future<Output = ()>,
    {
        let mut compute = interval(self.settings.compute_interval);
        compute.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut submit = match self.settings.cadence {
            SubmitCadence::Blocks(_) => interval(self.settings.block_poll_interval),
            SubmitCadence::Interval(every) => interval_at(Instant::now() + every, every),
        };
        submit.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            compute_ms = self.settings.compute_interval.as_millis() as u64,
            cadence = ?self.settings.cadence,
            dry_run = self.settings.submit.dry_run,
            netuid = self.settings.submit.netuid,
            "scheduler: started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(iterations = self.ctx.iterations, "scheduler: shutdown requested");
                    return Ok(());
                }
                _ = compute.tick() => {
                    let result = compute_iteration(&self.sources, &mut self.ctx).await.map(|_| ());
                    self.account(Stage::Compute, result)?;
                }
                _ = submit.tick() => {
                    match self.submission_tick().await {
                        Ok(None) => {}
                        Ok(Some(_)) => self.account(Stage::Submit, Ok(()))?,
                        Err(e) => self.account(Stage::Submit, Err(e))?,
                    }
                }
            }
        }
    }

    /// One submission-cadence tick. `Ok(None)` means nothing was due.
    pub async fn submission_tick(&mut self) -> Result<Option<SubmissionOutcome>, PipelineError> {
        if self.ctx.iterations == 0 {
            debug!("scheduler: no iteration computed yet, submission deferred");
            return Ok(None);
        }
        if let SubmitCadence::Blocks(every) = self.settings.cadence {
            let height = self.ledger.block_height().await?;
            if !self.ctx.submission_due(height, every) {
                debug!(height, last = ?self.ctx.last_submitted_block, every, "scheduler: submission not due");
                return Ok(None);
            }
        }
        submit_weights(self.ledger.as_ref(), &mut self.ctx, &self.settings.submit)
            .await
            .map(Some)
    }

    fn account(&mut self, stage: Stage, result: Result<(), PipelineError>) -> Result<(), PipelineError> {
        let budget = match stage {
            Stage::Compute => &mut self.ctx.compute_errors,
            Stage::Submit => &mut self.ctx.submit_errors,
        };
        match result {
            Ok(()) => {
                budget.record_success();
                Ok(())
            }
            Err(e) => {
                error!(
                    stage = stage.as_str(),
                    kind = e.kind(),
                    error = %e,
                    consecutive = budget.consecutive() + 1,
                    limit = budget.limit(),
                    "scheduler: step failed"
                );
                budget.record_failure()
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Compute,
    Submit,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::Compute => "compute",
            Stage::Submit => "submit",
        }
    }
}
