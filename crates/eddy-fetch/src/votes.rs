//! Governance votes from the indexer's GraphQL API.

use async_trait::async_trait;
use eddy_core::address::{account_key, normalize_address};
use eddy_core::constants::{MAX_VOTE_WEIGHT, VOTE_PAGE_SIZE};
use eddy_core::error::FetchError;
use eddy_core::traits::VoteSource;
use eddy_core::types::{VotePosition, VotesByVoter};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::graphql::collection;
use crate::lenient::{record_id, str_field, u64_field};
use crate::paginate::{Page, paginate};
use crate::retry::HttpFetcher;

const VOTES_QUERY: &str = r#"
query Votes($first: Int!, $skip: Int!) {
  votes(first: $first, skip: $skip, orderBy: id) {
    id
    publicKey
    poolAddress
    weight
    timestamp
  }
}"#;

/// Reads every current vote record from the indexer.
#[derive(Debug, Clone)]
pub struct IndexerVoteSource {
    fetcher: HttpFetcher,
    url: String,
    page_size: usize,
}

impl IndexerVoteSource {
    pub fn new(fetcher: HttpFetcher, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
            page_size: VOTE_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn fetch_page(&self, index: u32) -> Result<Page<VotePosition>, FetchError> {
        let skip = index as usize * self.page_size;
        let data = self
            .fetcher
            .graphql(&self.url, VOTES_QUERY, json!({ "first": self.page_size, "skip": skip }))
            .await?;
        let records = collection(&data, "votes", &self.url)?;

        let items = records
            .iter()
            .filter_map(|record| match parse_vote(record) {
                Ok(vote) => Some(vote),
                Err(reason) => {
                    warn!(record = %record_id(record), %reason, "votes: skipping malformed record");
                    None
                }
            })
            .collect();
        Ok(Page {
            items,
            fetched: records.len(),
            total_pages: None,
        })
    }
}

#[async_trait]
impl VoteSource for IndexerVoteSource {
    async fn fetch_votes(&self) -> Result<VotesByVoter, FetchError> {
        let votes = paginate(&self.url, self.page_size, |index| self.fetch_page(index)).await?;
        let count = votes.len();
        let grouped = group_by_voter(votes);
        debug!(records = count, voters = grouped.len(), "votes: fetched");
        Ok(grouped)
    }
}

/// Parse one vote record, or explain why it is unusable.
pub fn parse_vote(record: &Value) -> Result<VotePosition, String> {
    let voter = str_field(record, "publicKey")
        .and_then(account_key)
        .ok_or("missing publicKey")?;
    let pool_raw = str_field(record, "poolAddress").ok_or("missing poolAddress")?;
    let pool = normalize_address(pool_raw).map_err(|e| format!("poolAddress {pool_raw:?}: {e}"))?;
    let weight = u64_field(record, "weight").ok_or("weight is not a non-negative integer")?;
    if weight > u64::from(MAX_VOTE_WEIGHT) {
        return Err(format!("weight {weight} above {MAX_VOTE_WEIGHT}"));
    }
    Ok(VotePosition {
        voter,
        pool,
        weight: weight as u16,
    })
}

/// Concatenate vote records per voter, keeping record order.
pub fn group_by_voter(votes: Vec<VotePosition>) -> VotesByVoter {
    let mut grouped = VotesByVoter::new();
    for vote in votes {
        grouped.entry(vote.voter.clone()).or_default().push(vote);
    }
    grouped
}
