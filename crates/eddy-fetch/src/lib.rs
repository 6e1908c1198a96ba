//! # eddy-fetch: Read-side collaborators of the validator.
//!
//! Everything that leaves the process over HTTP to read data lives here:
//!
//! - [`retry::HttpFetcher`]: shared `reqwest` client with hard timeouts and
//!   exponential backoff on 429 (and optionally on transient failures)
//! - [`paginate`]: page walker with short-page / total-pages termination
//! - [`cache::TtlCache`]: fresh / stale response cache used by the scheduler
//! - source implementations of the `eddy-core` traits: votes (GraphQL),
//!   balances (REST), registry (REST), liquidity positions (GraphQL,
//!   batched and concurrent)
//!
//! Remote payloads are parsed leniently: a malformed record is skipped with a
//! warning naming its id and never fails the whole fetch.

pub mod balances;
pub mod cache;
pub mod graphql;
pub mod lenient;
pub mod paginate;
pub mod positions;
pub mod registry;
pub mod retry;
pub mod votes;

pub use balances::RestBalanceSource;
pub use cache::TtlCache;
pub use paginate::{Page, paginate};
pub use positions::GraphQlPositionSource;
pub use registry::RestRegistrySource;
pub use retry::{HttpFetcher, RetryPolicy};
pub use votes::IndexerVoteSource;
