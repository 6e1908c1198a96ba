//! Full compute iterations and scheduler runs over mock HTTP services.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eddy_core::error::PipelineError;
use eddy_core::traits::WeightLedger;
use eddy_fetch::{GraphQlPositionSource, IndexerVoteSource, RestBalanceSource, RestRegistrySource};
use eddy_ledger::{LedgerConnection, LedgerSubmitter};
use eddy_tests::helpers::*;
use eddy_validator_lib::{
    Scheduler, SchedulerSettings, Sources, SubmitCadence, SubmitSettings, ValidatorContext,
    compute_iteration,
};

struct Services {
    votes: MockService,
    balances: MockService,
    registry: MockService,
    positions: MockService,
}

/// Three linked miners: 0 and 2 in pool X, 1 in pool Y, identical geometry.
async fn scenario_services() -> Services {
    let positions = vec![
        position_record("p1", &owner(1), POOL_X, 0, -100, 100, 1_000_000_000),
        position_record("p2", &owner(2), POOL_Y, 0, -100, 100, 1_000_000_000),
        position_record("p3", &owner(3), POOL_X, 0, -100, 100, 1_000_000_000),
    ];
    Services {
        votes: graphql_service("votes", scenario_votes()).await,
        balances: balance_service(&scenario_balances()).await,
        registry: registry_service(registry_body(3), 0).await,
        positions: graphql_service("positions", positions).await,
    }
}

fn sources(services: &Services) -> Sources {
    let fetcher = fast_fetcher(0);
    Sources {
        votes: Arc::new(IndexerVoteSource::new(fetcher.clone(), &services.votes.url)),
        balances: Arc::new(RestBalanceSource::new(fetcher.clone(), &services.balances.url)),
        registry: Arc::new(RestRegistrySource::new(fetcher.clone(), &services.registry.url)),
        positions: Arc::new(GraphQlPositionSource::new(fetcher, &services.positions.url)),
    }
}

fn settings(dir: &std::path::Path, cadence: SubmitCadence, dry_run: bool) -> SchedulerSettings {
    SchedulerSettings {
        compute_interval: Duration::from_millis(20),
        cadence,
        block_poll_interval: Duration::from_millis(10),
        submit: SubmitSettings {
            netuid: 3,
            dry_run,
            snapshots_dir: dir.join("snapshots"),
        },
    }
}

#[tokio::test]
async fn iteration_weights_miners_by_pool_votes() {
    let services = scenario_services().await;
    let mut ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 5);

    let report = compute_iteration(&sources(&services), &mut ctx).await.unwrap();

    assert_eq!(report.voters, 2);
    assert_eq!(report.pools, 2);
    assert_eq!(report.linked_miners, 3);
    assert_eq!(report.positions, 3);
    // Pool X (0.8) is split evenly between miners 0 and 2.
    assert!((report.raw_weights[&0] - 0.4).abs() < 1e-9);
    assert!((report.raw_weights[&1] - 0.2).abs() < 1e-9);
    assert!((report.raw_weights[&2] - 0.4).abs() < 1e-9);
    assert!((ctx.ema.get(0) - 0.2).abs() < 1e-9);
}

#[tokio::test]
async fn fresh_cache_avoids_refetching_votes_and_balances() {
    let services = scenario_services().await;
    let sources = sources(&services);
    let mut ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 5);

    compute_iteration(&sources, &mut ctx).await.unwrap();
    compute_iteration(&sources, &mut ctx).await.unwrap();

    assert_eq!(services.votes.hits(), 1);
    assert_eq!(services.balances.hits(), 1);
    assert_eq!(services.registry.hits(), 2);
    assert_eq!(ctx.iterations, 2);
}

#[tokio::test]
async fn stale_cache_used_when_indexer_fails() {
    let services = scenario_services().await;
    let mut ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 5);
    compute_iteration(&sources(&services), &mut ctx).await.unwrap();

    let old = Instant::now() - Duration::from_secs(3_600);
    let votes = ctx.votes.stale().cloned().unwrap();
    ctx.votes.store_at(votes, old);

    let down = unavailable_service().await;
    let mut broken = sources(&services);
    broken.votes = Arc::new(IndexerVoteSource::new(fast_fetcher(0), &down.url));

    let report = compute_iteration(&broken, &mut ctx).await.unwrap();
    assert!(report.stale_votes);
    assert!(!report.stale_balances);
    assert_eq!(down.hits(), 1);
    assert!((report.raw_weights[&0] - 0.4).abs() < 1e-9);
}

#[tokio::test]
async fn failed_fetch_without_cache_is_a_network_error() {
    let services = scenario_services().await;
    let down = unavailable_service().await;
    let mut broken = sources(&services);
    broken.votes = Arc::new(IndexerVoteSource::new(fast_fetcher(0), &down.url));
    let mut ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 5);

    let err = compute_iteration(&broken, &mut ctx).await.unwrap_err();
    assert!(matches!(err, PipelineError::Network(_)), "{err:?}");
    assert!(ctx.ema.is_empty());
}

#[tokio::test]
async fn no_votes_means_no_position_queries() {
    let services = scenario_services().await;
    let empty_votes = graphql_service("votes", Vec::new()).await;
    let mut quiet = sources(&services);
    quiet.votes = Arc::new(IndexerVoteSource::new(fast_fetcher(0), &empty_votes.url));
    let mut ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 5);

    let report = compute_iteration(&quiet, &mut ctx).await.unwrap();
    assert_eq!(report.pools, 0);
    assert!(report.raw_weights.is_empty());
    assert_eq!(services.positions.hits(), 0);
    assert_eq!(services.balances.hits(), 0);
}

#[tokio::test]
async fn scheduler_exits_when_error_budget_is_spent() {
    let services = scenario_services().await;
    let down = unavailable_service().await;
    let mut broken = sources(&services);
    broken.votes = Arc::new(IndexerVoteSource::new(fast_fetcher(0), &down.url));

    let ledger = MockLedger::start(3, 8, 100, vec![in_block("0x01")]).await;
    let connection = LedgerConnection::connect(&ledger.url).await.unwrap();
    let submitter: Arc<dyn WeightLedger> = Arc::new(LedgerSubmitter::new(connection, Some(test_key()), 3));

    let dir = tempfile::tempdir().unwrap();
    let ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 3);
    let mut scheduler = Scheduler::new(broken, submitter, ctx, settings(dir.path(), SubmitCadence::Blocks(10), false));

    let result = tokio::time::timeout(Duration::from_secs(10), scheduler.run_until(std::future::pending()))
        .await
        .expect("scheduler kept running");
    assert_eq!(result, Err(PipelineError::ErrorBudgetExhausted { errors: 3, limit: 3 }));
    assert_eq!(down.hits(), 3);
    assert!(ledger.received().is_empty());
}

#[tokio::test]
async fn scheduler_submits_on_interval_cadence() {
    let services = scenario_services().await;
    let ledger = MockLedger::start(3, 8, 4_242, vec![in_block("0x01")]).await;
    let connection = LedgerConnection::connect(&ledger.url).await.unwrap();
    let submitter: Arc<dyn WeightLedger> = Arc::new(LedgerSubmitter::new(connection, Some(test_key()), 3));

    let dir = tempfile::tempdir().unwrap();
    let ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 5);
    let mut scheduler = Scheduler::new(
        sources(&services),
        submitter,
        ctx,
        settings(dir.path(), SubmitCadence::Interval(Duration::from_millis(60)), false),
    );

    scheduler
        .run_until(tokio::time::sleep(Duration::from_millis(400)))
        .await
        .unwrap();

    let received = ledger.received();
    assert!(!received.is_empty());
    let call = &received[0].call;
    assert_eq!(call.netuid, 3);
    assert_eq!(call.uids, vec![0, 1, 2]);
    assert_eq!(call.version_key, 4_242);
    assert_eq!(call.weights.iter().map(|w| u32::from(*w)).sum::<u32>(), 65535);
    assert!(call.weights[0].abs_diff(call.weights[2]) <= 1);
    assert!(call.weights[1].abs_diff(13107) <= 1);
    assert_eq!(scheduler.context().last_submitted_block, Some(4_242));
}

#[tokio::test]
async fn block_cadence_waits_for_interval() {
    let services = scenario_services().await;
    let ledger = MockLedger::start(3, 8, 1_000, vec![in_block("0x01")]).await;
    let connection = LedgerConnection::connect(&ledger.url).await.unwrap();
    let submitter: Arc<dyn WeightLedger> = Arc::new(LedgerSubmitter::new(connection, Some(test_key()), 3));

    let dir = tempfile::tempdir().unwrap();
    let ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 5);
    let mut scheduler = Scheduler::new(
        sources(&services),
        submitter,
        ctx,
        settings(dir.path(), SubmitCadence::Blocks(100), false),
    );

    // The first submission happens as soon as weights exist; the height never
    // moves, so nothing else is due.
    scheduler
        .run_until(tokio::time::sleep(Duration::from_millis(300)))
        .await
        .unwrap();
    assert_eq!(ledger.received().len(), 1);

    ledger.set_height(1_100);
    scheduler
        .run_until(tokio::time::sleep(Duration::from_millis(300)))
        .await
        .unwrap();
    let received = ledger.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[1].call.version_key, 1_100);
}

#[tokio::test]
async fn dry_run_scheduler_writes_snapshots_only() {
    let services = scenario_services().await;
    let ledger = MockLedger::start(3, 8, 77, vec![in_block("0x01")]).await;
    let connection = LedgerConnection::connect(&ledger.url).await.unwrap();
    // No key: a real submission would fail.
    let submitter: Arc<dyn WeightLedger> = Arc::new(LedgerSubmitter::new(connection, None, 3));

    let dir = tempfile::tempdir().unwrap();
    let ctx = ValidatorContext::new(0.5, Duration::from_secs(300), 5);
    let mut scheduler = Scheduler::new(
        sources(&services),
        submitter,
        ctx,
        settings(dir.path(), SubmitCadence::Interval(Duration::from_millis(60)), true),
    );
    scheduler
        .run_until(tokio::time::sleep(Duration::from_millis(300)))
        .await
        .unwrap();

    assert!(ledger.received().is_empty());
    let snapshots: Vec<_> = std::fs::read_dir(dir.path().join("snapshots"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert!(!snapshots.is_empty());
    let snap = eddy_validator_lib::WeightSnapshot::read(&snapshots[0]).unwrap();
    assert!(snap.dry_run);
    assert_eq!(snap.block, 77);
    assert_eq!(snap.uids, vec![0, 1, 2]);
    assert!(snap.tx_hash.is_none());
    assert_eq!(scheduler.context().compute_errors.consecutive(), 0);
    assert_eq!(scheduler.context().submit_errors.consecutive(), 0);
}
