//! Concentrated-liquidity positions of linked miners.
//!
//! Owners are split into batches of [`POSITION_OWNER_BATCH`]. Each batch is one
//! paginated GraphQL walk; up to [`MAX_CONCURRENT_BATCHES`] walks run at once
//! and all of them are joined before the fetch returns.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use eddy_core::address::normalize_address;
use eddy_core::constants::{MAX_CONCURRENT_BATCHES, POSITION_OWNER_BATCH, POSITION_PAGE_SIZE};
use eddy_core::error::FetchError;
use eddy_core::traits::PositionSource;
use eddy_core::types::{FeeTier, LiquidityPosition, MinerRegistry, PositionsByMiner};
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::graphql::collection;
use crate::lenient::{i64_field, record_id, str_field, u64_field, u128_field};
use crate::paginate::{Page, paginate};
use crate::retry::HttpFetcher;

const POSITIONS_QUERY: &str = r#"
query Positions($owners: [String!]!, $pools: [String!]!, $dust: BigInt!, $first: Int!, $skip: Int!) {
  positions(
    first: $first
    skip: $skip
    orderBy: id
    where: { owner_in: $owners, pool_in: $pools, liquidity_gt: $dust }
  ) {
    id
    owner
    pool { id feeTier tick }
    tickLower
    tickUpper
    liquidity
    token0 { id }
    token1 { id }
  }
}"#;

#[derive(Debug, Clone)]
pub struct GraphQlPositionSource {
    fetcher: HttpFetcher,
    url: String,
    dust: u128,
    owner_batch: usize,
    page_size: usize,
    max_concurrent: usize,
}

impl GraphQlPositionSource {
    pub fn new(fetcher: HttpFetcher, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
            dust: 0,
            owner_batch: POSITION_OWNER_BATCH,
            page_size: POSITION_PAGE_SIZE,
            max_concurrent: MAX_CONCURRENT_BATCHES,
        }
    }

    /// Only positions with liquidity strictly above `dust` are requested.
    pub fn with_dust(mut self, dust: u128) -> Self {
        self.dust = dust;
        self
    }

    pub fn with_batching(mut self, owner_batch: usize, page_size: usize, max_concurrent: usize) -> Self {
        self.owner_batch = owner_batch.max(1);
        self.page_size = page_size.max(1);
        self.max_concurrent = max_concurrent.max(1);
        self
    }
}

#[async_trait]
impl PositionSource for GraphQlPositionSource {
    async fn fetch_positions(
        &self,
        registry: &MinerRegistry,
        target_pools: &[String],
    ) -> Result<PositionsByMiner, FetchError> {
        let mut by_miner: PositionsByMiner = registry
            .linked_uids()
            .into_iter()
            .map(|uid| (uid, Vec::new()))
            .collect();
        let owners = registry.linked_owners();
        if owners.is_empty() || target_pools.is_empty() {
            debug!(owners = owners.len(), pools = target_pools.len(), "positions: nothing to query");
            return Ok(by_miner);
        }

        let pools = Arc::new(target_pools.to_vec());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for batch in owners.chunks(self.owner_batch) {
            let batch = batch.to_vec();
            let pools = Arc::clone(&pools);
            let semaphore = Arc::clone(&semaphore);
            let fetcher = self.fetcher.clone();
            let url = self.url.clone();
            let (dust, page_size) = (self.dust, self.page_size);

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| FetchError::Transport {
                    url: url.clone(),
                    reason: format!("batch limiter closed: {e}"),
                })?;
                fetch_batch(&fetcher, &url, &batch, &pools, dust, page_size).await
            });
        }

        let mut positions = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let batch = joined.map_err(|e| FetchError::Transport {
                url: self.url.clone(),
                reason: format!("batch task failed: {e}"),
            })??;
            positions.extend(batch);
        }

        let wanted: HashSet<&str> = pools.iter().map(String::as_str).collect();
        let total = positions.len();
        for position in positions {
            if !wanted.contains(position.pool_id.as_str()) {
                continue;
            }
            match registry.uid_for_owner(&position.owner) {
                Some(uid) => by_miner.entry(uid).or_default().push(position),
                None => warn!(position = %position.id, owner = %position.owner, "positions: owner not in registry, skipping"),
            }
        }
        for list in by_miner.values_mut() {
            list.sort_by(|a, b| a.id.cmp(&b.id));
        }

        debug!(positions = total, miners = by_miner.len(), "positions: fetched");
        Ok(by_miner)
    }
}

/// Walk every page of one owner batch.
async fn fetch_batch(
    fetcher: &HttpFetcher,
    url: &str,
    owners: &[String],
    pools: &[String],
    dust: u128,
    page_size: usize,
) -> Result<Vec<LiquidityPosition>, FetchError> {
    paginate(url, page_size, |index| async move {
        let variables = json!({
            "owners": owners,
            "pools": pools,
            "dust": dust.to_string(),
            "first": page_size,
            "skip": index as usize * page_size,
        });
        let data = fetcher.graphql(url, POSITIONS_QUERY, variables).await?;
        let records = collection(&data, "positions", url)?;
        let items = records
            .iter()
            .filter_map(|record| match parse_position(record) {
                Ok(position) => Some(position),
                Err(reason) => {
                    warn!(position = %record_id(record), %reason, "positions: skipping malformed record");
                    None
                }
            })
            .collect();
        Ok::<_, FetchError>(Page {
            items,
            fetched: records.len(),
            total_pages: None,
        })
    })
    .await
}

/// Parse one position record, or explain why it is unusable.
pub fn parse_position(record: &Value) -> Result<LiquidityPosition, String> {
    let id = str_field(record, "id").ok_or("missing id")?;
    let owner_raw = str_field(record, "owner").ok_or("missing owner")?;
    let owner = normalize_address(owner_raw).map_err(|e| format!("owner {owner_raw:?}: {e}"))?;

    let pool = record.get("pool").filter(|p| p.is_object()).ok_or("missing pool")?;
    let pool_raw = str_field(pool, "id").ok_or("missing pool id")?;
    let pool_id = normalize_address(pool_raw).map_err(|e| format!("pool {pool_raw:?}: {e}"))?;
    let fee_raw = u64_field(pool, "feeTier").ok_or("missing pool feeTier")?;
    let fee_tier = u32::try_from(fee_raw)
        .map(FeeTier::from_raw)
        .map_err(|_| format!("feeTier {fee_raw} out of range"))?;
    let current_tick = match pool.get("tick") {
        None | Some(Value::Null) => None,
        Some(_) => Some(tick(pool, "tick").ok_or("pool tick out of range")?),
    };

    let tick_lower = tick(record, "tickLower").ok_or("missing tickLower")?;
    let tick_upper = tick(record, "tickUpper").ok_or("missing tickUpper")?;
    let liquidity = u128_field(record, "liquidity").ok_or("missing liquidity")?;

    Ok(LiquidityPosition {
        id: id.to_string(),
        owner,
        pool_id,
        fee_tier,
        current_tick,
        tick_lower,
        tick_upper,
        liquidity,
    })
}

/// A tick as a plain integer or as a `{tickIdx}` object.
fn tick(record: &Value, key: &str) -> Option<i32> {
    let raw = match record.get(key)? {
        Value::Object(_) => i64_field(&record[key], "tickIdx"),
        _ => i64_field(record, key),
    }?;
    i32::try_from(raw).ok()
}
