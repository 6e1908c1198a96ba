//! Mock services and fixtures shared by the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use eddy_fetch::{HttpFetcher, RetryPolicy};
use eddy_ledger::api::LedgerApiServer;
use eddy_ledger::{SignedCall, TxStatus, ValidatorKey};
use jsonrpsee::core::{SubscriptionResult, async_trait};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::{PendingSubscriptionSink, SubscriptionMessage};
use serde_json::{Map, Value, json};

pub const POOL_X: &str = "0x000000000000000000000000000000000000000a";
pub const POOL_Y: &str = "0x000000000000000000000000000000000000000b";
pub const VOTER_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const VOTER_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

/// Deterministic validator key used by every test.
pub fn test_key() -> ValidatorKey {
    ValidatorKey::from_seed(&[7u8; 32])
}

/// Miner `n`'s linked settlement address.
pub fn owner(n: u8) -> String {
    format!("0x{}", hex_byte(n).repeat(20))
}

fn hex_byte(n: u8) -> String {
    format!("{n:02x}")
}

/// Fetcher with millisecond backoff so retry tests stay fast.
pub fn fast_fetcher(max_retries: u32) -> HttpFetcher {
    HttpFetcher::with_timeout(
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(5),
            cap_delay: Duration::from_millis(20),
            retry_transient: true,
        },
        Duration::from_secs(5),
    )
    .unwrap()
}

// ------------------------------------------------------------------
// HTTP services
// ------------------------------------------------------------------

/// A running mock HTTP service.
pub struct MockService {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl MockService {
    /// Requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn serve(router: Router, hits: Arc<AtomicUsize>) -> MockService {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    MockService {
        url: format!("http://{addr}"),
        hits,
    }
}

#[derive(Clone)]
struct GraphQlState {
    field: &'static str,
    records: Arc<Vec<Value>>,
    hits: Arc<AtomicUsize>,
}

/// Lowercased string list at `variables.<key>`, if present.
fn filter_list(variables: &Value, key: &str) -> Option<Vec<String>> {
    variables.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_ascii_lowercase)
            .collect()
    })
}

fn passes(filter: &Option<Vec<String>>, value: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(allowed) => value.is_some_and(|v| allowed.contains(&v.to_ascii_lowercase())),
    }
}

async fn graphql_handler(State(state): State<GraphQlState>, Json(body): Json<Value>) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let variables = &body["variables"];
    let first = variables["first"].as_u64().unwrap_or(100) as usize;
    let skip = variables["skip"].as_u64().unwrap_or(0) as usize;
    let owners = filter_list(variables, "owners");
    let pools = filter_list(variables, "pools");

    let page: Vec<Value> = state
        .records
        .iter()
        .filter(|r| passes(&owners, r["owner"].as_str()))
        .filter(|r| passes(&pools, r["pool"]["id"].as_str()))
        .skip(skip)
        .take(first)
        .cloned()
        .collect();

    let mut data = Map::new();
    data.insert(state.field.to_string(), Value::Array(page));
    Json(json!({ "data": data }))
}

/// GraphQL endpoint serving `records` under `data.<field>`, honouring
/// `first`/`skip` and the `owners`/`pools` filters of the position query.
pub async fn graphql_service(field: &'static str, records: Vec<Value>) -> MockService {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = GraphQlState {
        field,
        records: Arc::new(records),
        hits: Arc::clone(&hits),
    };
    let router = Router::new().route("/", post(graphql_handler)).with_state(state);
    serve(router, hits).await
}

/// GraphQL endpoint that answers every query with an `errors` array.
pub async fn graphql_error_service(message: &'static str) -> MockService {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let router = Router::new().route(
        "/",
        post(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Json(json!({ "data": null, "errors": [{ "message": message }] }))
            }
        }),
    );
    serve(router, hits).await
}

#[derive(Clone)]
struct BalanceState {
    records: Arc<Vec<Value>>,
    /// Largest page the service will serve, whatever the client asks for.
    max_page_size: usize,
    hits: Arc<AtomicUsize>,
}

async fn balances_handler(
    State(state): State<BalanceState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let page: usize = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let size: usize = query
        .get("page_size")
        .and_then(|p| p.parse().ok())
        .unwrap_or(100)
        .min(state.max_page_size)
        .max(1);
    let total_pages = state.records.len().div_ceil(size).max(1);
    let items: Vec<Value> = state
        .records
        .iter()
        .skip((page - 1) * size)
        .take(size)
        .cloned()
        .collect();
    Json(json!({
        "balances": items,
        "pagination": { "current_page": page, "total_pages": total_pages }
    }))
}

/// Paginated `GET /balances` serving `(address, balance)` pairs.
pub async fn balance_service(balances: &[(&str, f64)]) -> MockService {
    capped_balance_service(balances, usize::MAX).await
}

/// Like [`balance_service`], but never serves more than `max_page_size`
/// records per page.
pub async fn capped_balance_service(balances: &[(&str, f64)], max_page_size: usize) -> MockService {
    let records = balances
        .iter()
        .map(|(address, balance)| json!({ "address": address, "balance": balance }))
        .collect();
    let hits = Arc::new(AtomicUsize::new(0));
    let state = BalanceState {
        records: Arc::new(records),
        max_page_size,
        hits: Arc::clone(&hits),
    };
    let router = Router::new()
        .route("/balances", get(balances_handler))
        .with_state(state);
    serve(router, hits).await
}

/// `GET /miners` returning `body`, after answering the first `rate_limited`
/// requests with 429.
pub async fn registry_service(body: Value, rate_limited: usize) -> MockService {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let body = Arc::new(body);
    let router = Router::new().route(
        "/miners",
        get(move || {
            let counter = Arc::clone(&counter);
            let body = Arc::clone(&body);
            async move {
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                if seen < rate_limited {
                    return (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "0")], "slow down").into_response();
                }
                Json(body.as_ref().clone()).into_response()
            }
        }),
    );
    serve(router, hits).await
}

/// Every route answers 503.
pub async fn unavailable_service() -> MockService {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let router = Router::new().fallback(move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Response::builder()
                .status(StatusCode::SERVICE_UNAVAILABLE)
                .body(axum::body::Body::from("maintenance"))
                .unwrap()
        }
    });
    serve(router, hits).await
}

// ------------------------------------------------------------------
// Fixtures
// ------------------------------------------------------------------

pub fn vote_record(id: &str, voter: &str, pool: &str, weight: u16) -> Value {
    json!({
        "id": id,
        "publicKey": voter,
        "poolAddress": pool,
        "weight": weight.to_string(),
        "timestamp": "1700000000"
    })
}

/// Voters A (100; X 70%, Y 30%) and B (50; X 100%) give X 0.8 and Y 0.2.
pub fn scenario_votes() -> Vec<Value> {
    vec![
        vote_record("v1", VOTER_A, POOL_X, 7000),
        vote_record("v2", VOTER_A, POOL_Y, 3000),
        vote_record("v3", VOTER_B, POOL_X, 10000),
    ]
}

pub fn scenario_balances() -> Vec<(&'static str, f64)> {
    vec![(VOTER_A, 100.0), (VOTER_B, 50.0)]
}

pub fn position_record(id: &str, owner: &str, pool: &str, tick: i32, lower: i32, upper: i32, liquidity: u128) -> Value {
    json!({
        "id": id,
        "owner": owner,
        "pool": { "id": pool, "feeTier": "3000", "tick": tick.to_string() },
        "tickLower": lower.to_string(),
        "tickUpper": upper.to_string(),
        "liquidity": liquidity.to_string(),
        "token0": { "id": "0x01" },
        "token1": { "id": "0x02" }
    })
}

/// Miners 0..n, each linked to [`owner`]`(uid + 1)`.
pub fn registry_body(n: u8) -> Value {
    Value::Array(
        (0..n)
            .map(|uid| json!({ "uid": uid, "hotkey": format!("hotkey-{uid}"), "linked_address": owner(uid + 1) }))
            .collect(),
    )
}

// ------------------------------------------------------------------
// Ledger node
// ------------------------------------------------------------------

/// Shared state of the mock ledger node.
pub struct LedgerState {
    pub netuid: u16,
    pub subnet_size: u16,
    height: AtomicU64,
    statuses: Mutex<Vec<TxStatus>>,
    received: Mutex<Vec<SignedCall>>,
}

struct LedgerRpc {
    state: Arc<LedgerState>,
}

#[async_trait]
impl LedgerApiServer for LedgerRpc {
    async fn block_height(&self) -> Result<u64, ErrorObjectOwned> {
        Ok(self.state.height.load(Ordering::SeqCst))
    }

    async fn subnet_size(&self, netuid: u16) -> Result<u16, ErrorObjectOwned> {
        if netuid != self.state.netuid {
            return Err(ErrorObjectOwned::owned(-32000, format!("unknown subnet {netuid}"), None::<()>));
        }
        Ok(self.state.subnet_size)
    }

    async fn submit_and_watch_weights(&self, pending: PendingSubscriptionSink, signed_hex: String) -> SubscriptionResult {
        let checked = SignedCall::from_hex(&signed_hex).and_then(|signed| signed.verify().map(|()| signed));
        let signed = match checked {
            Ok(signed) => signed,
            Err(e) => {
                pending
                    .reject(ErrorObjectOwned::owned(-32602, e.to_string(), None::<()>))
                    .await;
                return Ok(());
            }
        };
        self.state.received.lock().unwrap().push(signed);

        let statuses = self.state.statuses.lock().unwrap().clone();
        let Ok(sink) = pending.accept().await else {
            return Ok(());
        };
        for status in statuses {
            let message = SubscriptionMessage::from_json(&status)?;
            if sink.send(message).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// A running mock ledger node.
pub struct MockLedger {
    pub url: String,
    pub state: Arc<LedgerState>,
    handle: ServerHandle,
}

impl MockLedger {
    /// Start a node at `height` that answers each submission with `statuses`.
    pub async fn start(netuid: u16, subnet_size: u16, height: u64, statuses: Vec<TxStatus>) -> Self {
        let state = Arc::new(LedgerState {
            netuid,
            subnet_size,
            height: AtomicU64::new(height),
            statuses: Mutex::new(statuses),
            received: Mutex::new(Vec::new()),
        });
        let server = Server::builder().build("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let rpc = LedgerRpc {
            state: Arc::clone(&state),
        };
        let handle = server.start(rpc.into_rpc());
        Self {
            url: format!("ws://{addr}"),
            state,
            handle,
        }
    }

    pub fn set_height(&self, height: u64) {
        self.state.height.store(height, Ordering::SeqCst);
    }

    pub fn set_statuses(&self, statuses: Vec<TxStatus>) {
        *self.state.statuses.lock().unwrap() = statuses;
    }

    /// Verified submissions received so far.
    pub fn received(&self) -> Vec<SignedCall> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn stop(&self) {
        let _ = self.handle.stop();
    }

    /// Stop the node, wait for it to go away, and serve again on the same
    /// address with the same state.
    pub async fn restart(&mut self) {
        self.stop();
        self.handle.clone().stopped().await;
        let addr = self.url.trim_start_matches("ws://").to_string();
        let server = Server::builder().build(addr).await.unwrap();
        let rpc = LedgerRpc {
            state: Arc::clone(&self.state),
        };
        self.handle = server.start(rpc.into_rpc());
    }
}

pub fn in_block(block: &str) -> TxStatus {
    TxStatus::InBlock {
        block: block.to_string(),
        dispatch_error: None,
    }
}

pub fn finalized(block: &str) -> TxStatus {
    TxStatus::Finalized {
        block: block.to_string(),
        dispatch_error: None,
    }
}
