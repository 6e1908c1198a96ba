//! Integration test suite for the Eddy validator.
//!
//! Each test runs the real fetchers, scheduler and ledger client against
//! in-process mock services: axum HTTP servers standing in for the indexer,
//! balance and registry services, and a jsonrpsee server standing in for the
//! ledger node.

pub mod helpers;
