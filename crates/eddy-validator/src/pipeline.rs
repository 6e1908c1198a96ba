//! One compute iteration: votes through smoothing.

use std::sync::Arc;

use eddy_core::error::{FetchError, PipelineError};
use eddy_core::traits::{BalanceSource, PositionSource, RegistrySource, VoteSource};
use eddy_core::types::{Balances, LiquidityPosition, MinerRegistry, MinerWeights, PositionsByMiner, Uid, VotesByVoter};
use eddy_scoring::{aggregate_pool_weights, score_miners};
use tracing::{debug, info, warn};

use crate::context::{CachedBalances, ValidatorContext};

/// The read-side collaborators of one validator.
#[derive(Clone)]
pub struct Sources {
    pub votes: Arc<dyn VoteSource>,
    pub balances: Arc<dyn BalanceSource>,
    pub registry: Arc<dyn RegistrySource>,
    pub positions: Arc<dyn PositionSource>,
}

/// Summary of a completed iteration, for logs and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub iteration: u64,
    pub voters: usize,
    pub pools: usize,
    pub miners: usize,
    pub linked_miners: usize,
    pub positions: usize,
    /// This iteration's un-smoothed miner weights.
    pub raw_weights: MinerWeights,
    pub stale_votes: bool,
    pub stale_balances: bool,
}

/// Run votes → balances → pool weights → registry → positions → scoring →
/// smoothing, folding the result into `ctx.ema`.
///
/// The EMA is only touched once every fetch has succeeded, so a failed
/// iteration leaves the state exactly as it was.
pub async fn compute_iteration(
    sources: &Sources,
    ctx: &mut ValidatorContext,
) -> Result<IterationReport, PipelineError> {
    let (votes, stale_votes) = load_votes(sources.votes.as_ref(), ctx).await?;

    let mut voters: Vec<String> = votes.keys().cloned().collect();
    voters.sort();
    let (balances, stale_balances) = load_balances(sources.balances.as_ref(), ctx, &voters).await?;

    let pool_weights = aggregate_pool_weights(&votes, &balances);
    let target_pools: Vec<String> = pool_weights
        .iter()
        .filter(|(_, w)| **w > 0.0)
        .map(|(pool, _)| pool.clone())
        .collect();
    debug!(voters = voters.len(), pools = target_pools.len(), "pipeline: pool weights");

    let registry = sources.registry.fetch_registry().await.inspect_err(|e| {
        warn!(stage = "registry", error = %e, "pipeline: registry fetch failed");
    })?;
    let linked = registry.linked_uids().len();

    let positions_by_miner = if target_pools.is_empty() || linked == 0 {
        debug!(pools = target_pools.len(), linked, "pipeline: nothing to score");
        PositionsByMiner::new()
    } else {
        sources
            .positions
            .fetch_positions(&registry, &target_pools)
            .await
            .inspect_err(|e| {
                warn!(stage = "positions", error = %e, "pipeline: position fetch failed");
            })?
    };
    let positions_by_miner = screen_positions(positions_by_miner, &registry, &target_pools);
    let position_count = positions_by_miner.values().map(Vec::len).sum();

    let raw_weights = score_miners(&positions_by_miner, &pool_weights);
    ctx.ema.update(&raw_weights);
    ctx.iterations += 1;

    let report = IterationReport {
        iteration: ctx.iterations,
        voters: voters.len(),
        pools: target_pools.len(),
        miners: registry.len(),
        linked_miners: linked,
        positions: position_count,
        raw_weights,
        stale_votes,
        stale_balances,
    };
    info!(
        iteration = report.iteration,
        voters = report.voters,
        pools = report.pools,
        miners = report.miners,
        linked = report.linked_miners,
        positions = report.positions,
        scored = report.raw_weights.values().filter(|w| **w > 0.0).count(),
        "pipeline: iteration complete"
    );
    Ok(report)
}

async fn load_votes(source: &dyn VoteSource, ctx: &mut ValidatorContext) -> Result<(VotesByVoter, bool), PipelineError> {
    if let Some(votes) = ctx.votes.fresh() {
        debug!(voters = votes.len(), "pipeline: votes from cache");
        return Ok((votes.clone(), false));
    }
    match source.fetch_votes().await {
        Ok(votes) => {
            ctx.votes.store(votes.clone());
            Ok((votes, false))
        }
        Err(e) => stale_or(ctx.votes.stale().cloned(), "votes", e),
    }
}

async fn load_balances(
    source: &dyn BalanceSource,
    ctx: &mut ValidatorContext,
    voters: &[String],
) -> Result<(Balances, bool), PipelineError> {
    if let Some(cached) = ctx.balances.fresh().filter(|c| c.covers(voters)) {
        debug!(addresses = voters.len(), "pipeline: balances from cache");
        return Ok((cached.project(voters), false));
    }
    match source.fetch_balances(voters).await {
        Ok(balances) => {
            ctx.balances.store(CachedBalances {
                requested: voters.iter().cloned().collect(),
                balances: balances.clone(),
            });
            Ok((balances, false))
        }
        Err(e) => stale_or(ctx.balances.stale().map(|c| c.project(voters)), "balances", e),
    }
}

/// Drop positions a source attributed to the wrong miner or pool.
fn screen_positions(
    positions_by_miner: PositionsByMiner,
    registry: &MinerRegistry,
    target_pools: &[String],
) -> PositionsByMiner {
    let linked = registry.linked_uids();
    positions_by_miner
        .into_iter()
        .filter_map(|(uid, positions)| {
            if linked.binary_search(&uid).is_err() {
                warn!(stage = "positions", uid, count = positions.len(), "pipeline: positions for unlinked miner dropped");
                return None;
            }
            let kept = positions
                .into_iter()
                .filter(|pos| match check_position(uid, pos, registry, target_pools) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(stage = "positions", uid, kind = e.kind(), error = %e, "pipeline: record skipped");
                        false
                    }
                })
                .collect();
            Some((uid, kept))
        })
        .collect()
}

fn check_position(
    uid: Uid,
    pos: &LiquidityPosition,
    registry: &MinerRegistry,
    target_pools: &[String],
) -> Result<(), PipelineError> {
    if registry.uid_for_owner(&pos.owner) != Some(uid) {
        return Err(PipelineError::Validation {
            record: pos.id.clone(),
            reason: format!("owner {} is not linked to uid {uid}", pos.owner),
        });
    }
    if !target_pools.contains(&pos.pool_id) {
        return Err(PipelineError::Validation {
            record: pos.id.clone(),
            reason: format!("pool {} has no vote weight", pos.pool_id),
        });
    }
    Ok(())
}

fn stale_or<T>(stale: Option<T>, stage: &'static str, err: FetchError) -> Result<(T, bool), PipelineError> {
    match stale {
        Some(value) => {
            warn!(stage, error = %err, "pipeline: fetch failed, using stale cache");
            Ok((value, true))
        }
        None => {
            warn!(stage, error = %err, "pipeline: fetch failed with no cached fallback");
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use eddy_core::types::{FeeTier, LiquidityPosition, MinerEntry, MinerRegistry, VotePosition};

    const VOTER_A: &str = "0x00000000000000000000000000000000000000aa";
    const VOTER_B: &str = "0x00000000000000000000000000000000000000bb";
    const POOL_X: &str = "0x0000000000000000000000000000000000000001";
    const POOL_Y: &str = "0x0000000000000000000000000000000000000002";
    const OWNER_1: &str = "0x1111111111111111111111111111111111111111";
    const OWNER_2: &str = "0x2222222222222222222222222222222222222222";

    fn unavailable() -> FetchError {
        FetchError::Transport {
            url: "http://mock".into(),
            reason: "connection refused".into(),
        }
    }

    struct Votes {
        calls: AtomicUsize,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl VoteSource for Votes {
        async fn fetch_votes(&self) -> Result<VotesByVoter, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock().unwrap() {
                return Err(unavailable());
            }
            let vote = |voter: &str, pool: &str, weight| VotePosition {
                voter: voter.to_string(),
                pool: pool.to_string(),
                weight,
            };
            Ok([
                (VOTER_A.to_string(), vec![vote(VOTER_A, POOL_X, 7000), vote(VOTER_A, POOL_Y, 3000)]),
                (VOTER_B.to_string(), vec![vote(VOTER_B, POOL_X, 10000)]),
            ]
            .into_iter()
            .collect())
        }
    }

    struct Balance {
        calls: AtomicUsize,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl BalanceSource for Balance {
        async fn fetch_balances(&self, addresses: &[String]) -> Result<Balances, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock().unwrap() {
                return Err(unavailable());
            }
            let all: Balances = [(VOTER_A.to_string(), 100.0), (VOTER_B.to_string(), 50.0)]
                .into_iter()
                .collect();
            Ok(addresses
                .iter()
                .filter_map(|a| all.get(a).map(|b| (a.clone(), *b)))
                .collect())
        }
    }

    struct Registry;

    #[async_trait]
    impl RegistrySource for Registry {
        async fn fetch_registry(&self) -> Result<MinerRegistry, FetchError> {
            Ok(MinerRegistry::new(vec![
                MinerEntry { uid: 0, hotkey: "hk0".into(), linked_address: Some(OWNER_1.into()) },
                MinerEntry { uid: 1, hotkey: "hk1".into(), linked_address: Some(OWNER_2.into()) },
                MinerEntry { uid: 2, hotkey: "hk2".into(), linked_address: None },
            ]))
        }
    }

    struct Positions {
        requested_pools: Mutex<Vec<String>>,
        misattribute: Mutex<bool>,
    }

    #[async_trait]
    impl PositionSource for Positions {
        async fn fetch_positions(
            &self,
            registry: &MinerRegistry,
            target_pools: &[String],
        ) -> Result<PositionsByMiner, FetchError> {
            *self.requested_pools.lock().unwrap() = target_pools.to_vec();
            let pos = |id: &str, owner: &str, pool: &str| LiquidityPosition {
                id: id.to_string(),
                owner: owner.to_string(),
                pool_id: pool.to_string(),
                fee_tier: FeeTier::Medium,
                current_tick: Some(0),
                tick_lower: -100,
                tick_upper: 100,
                liquidity: 1_000_000_000,
            };
            let mut out = PositionsByMiner::new();
            for uid in registry.linked_uids() {
                out.insert(uid, Vec::new());
            }
            out.entry(0).or_default().push(pos("p1", OWNER_1, POOL_X));
            out.entry(1).or_default().push(pos("p2", OWNER_2, POOL_Y));
            if *self.misattribute.lock().unwrap() {
                out.entry(1).or_default().push(pos("stolen", OWNER_1, POOL_Y));
                out.entry(0).or_default().push(pos("off-pool", OWNER_1, "0x00000000000000000000000000000000000000ff"));
                out.entry(2).or_default().push(pos("unlinked", OWNER_2, POOL_X));
            }
            Ok(out)
        }
    }

    struct Fixture {
        votes: Arc<Votes>,
        balances: Arc<Balance>,
        positions: Arc<Positions>,
        sources: Sources,
    }

    fn fixture() -> Fixture {
        let votes = Arc::new(Votes { calls: AtomicUsize::new(0), fail: Mutex::new(false) });
        let balances = Arc::new(Balance { calls: AtomicUsize::new(0), fail: Mutex::new(false) });
        let positions = Arc::new(Positions {
            requested_pools: Mutex::new(Vec::new()),
            misattribute: Mutex::new(false),
        });
        let sources = Sources {
            votes: votes.clone(),
            balances: balances.clone(),
            registry: Arc::new(Registry),
            positions: positions.clone(),
        };
        Fixture { votes, balances, positions, sources }
    }

    #[tokio::test]
    async fn iteration_scores_linked_miners() {
        let f = fixture();
        let mut ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 5);
        let report = compute_iteration(&f.sources, &mut ctx).await.unwrap();

        assert_eq!(report.iteration, 1);
        assert_eq!(report.voters, 2);
        assert_eq!(report.pools, 2);
        assert_eq!(report.miners, 3);
        assert_eq!(report.linked_miners, 2);
        assert_eq!(report.positions, 2);
        // Pool X carries 0.8, pool Y 0.2; one full-score position each.
        assert!((report.raw_weights[&0] - 0.8).abs() < 1e-9);
        assert!((report.raw_weights[&1] - 0.2).abs() < 1e-9);
        assert!((ctx.ema.get(0) - 0.4).abs() < 1e-9);
        assert!((ctx.ema.get(1) - 0.1).abs() < 1e-9);
        assert_eq!(*f.positions.requested_pools.lock().unwrap(), vec![POOL_X.to_string(), POOL_Y.to_string()]);
    }

    #[tokio::test]
    async fn fresh_cache_skips_network() {
        let f = fixture();
        let mut ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 5);
        compute_iteration(&f.sources, &mut ctx).await.unwrap();
        compute_iteration(&f.sources, &mut ctx).await.unwrap();
        assert_eq!(f.votes.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.balances.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_cache_covers_failed_fetch() {
        let f = fixture();
        let mut ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 5);
        compute_iteration(&f.sources, &mut ctx).await.unwrap();

        // Expire both entries and break both sources.
        let old = Instant::now() - Duration::from_secs(600);
        let votes = ctx.votes.stale().cloned().unwrap();
        ctx.votes.store_at(votes, old);
        let balances = ctx.balances.stale().cloned().unwrap();
        ctx.balances.store_at(balances, old);
        *f.votes.fail.lock().unwrap() = true;
        *f.balances.fail.lock().unwrap() = true;

        let report = compute_iteration(&f.sources, &mut ctx).await.unwrap();
        assert!(report.stale_votes);
        assert!(report.stale_balances);
        assert!((report.raw_weights[&0] - 0.8).abs() < 1e-9);
        assert_eq!(f.votes.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_without_cache_leaves_ema_untouched() {
        let f = fixture();
        *f.votes.fail.lock().unwrap() = true;
        let mut ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 5);
        let err = compute_iteration(&f.sources, &mut ctx).await.unwrap_err();
        assert_eq!(err.kind(), "network");
        assert!(ctx.ema.is_empty());
        assert_eq!(ctx.iterations, 0);
    }

    #[test]
    fn position_checks_name_the_record() {
        let registry = MinerRegistry::new(vec![MinerEntry {
            uid: 0,
            hotkey: "hk0".into(),
            linked_address: Some(OWNER_1.into()),
        }]);
        let pos = LiquidityPosition {
            id: "p9".into(),
            owner: OWNER_2.into(),
            pool_id: POOL_X.into(),
            fee_tier: FeeTier::Medium,
            current_tick: Some(0),
            tick_lower: -10,
            tick_upper: 10,
            liquidity: 1,
        };
        let err = check_position(0, &pos, &registry, &[POOL_X.to_string()]).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(matches!(&err, PipelineError::Validation { record, .. } if record == "p9"));
    }

    #[tokio::test]
    async fn misattributed_positions_are_skipped() {
        let f = fixture();
        *f.positions.misattribute.lock().unwrap() = true;
        let mut ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 5);
        let report = compute_iteration(&f.sources, &mut ctx).await.unwrap();

        assert_eq!(report.positions, 2);
        assert!(!report.raw_weights.contains_key(&2));
        assert!((report.raw_weights[&0] - 0.8).abs() < 1e-9);
        assert!((report.raw_weights[&1] - 0.2).abs() < 1e-9);
    }
}
