//! Long-lived WebSocket connection to the ledger node.
//!
//! A background watcher awaits disconnection and reconnects with exponential
//! backoff, publishing each new client through a `watch` channel. Callers only
//! block on the channel when they actually need the connection.

use std::sync::Arc;
use std::time::Duration;

use eddy_core::constants::{QUERY_TIMEOUT, RECONNECT_BASE_DELAY, RECONNECT_CAP_DELAY};
use eddy_core::error::LedgerError;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How long a caller waits for the watcher to restore a lost connection.
const CONNECTION_WAIT: Duration = Duration::from_secs(120);

/// Reconnection delay before attempt `attempt` (0-based): 1 s doubling to 30 s.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(31));
    RECONNECT_BASE_DELAY.saturating_mul(factor).min(RECONNECT_CAP_DELAY)
}

async fn build_client(url: &str) -> Result<WsClient, LedgerError> {
    WsClientBuilder::default()
        .request_timeout(QUERY_TIMEOUT)
        .build(url)
        .await
        .map_err(|e| LedgerError::Connection(format!("{url}: {e}")))
}

pub struct LedgerConnection {
    url: String,
    current: watch::Receiver<Option<Arc<WsClient>>>,
    watcher: JoinHandle<()>,
}

impl LedgerConnection {
    /// Connect once and start the watcher. The first connection must succeed.
    pub async fn connect(url: &str) -> Result<Self, LedgerError> {
        let client = Arc::new(build_client(url).await?);
        info!(%url, "ledger: connected");

        let (tx, rx) = watch::channel(Some(Arc::clone(&client)));
        let watcher = tokio::spawn(watch_connection(url.to_string(), tx, client));
        Ok(Self {
            url: url.to_string(),
            current: rx,
            watcher,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether a live client is published right now.
    pub fn is_connected(&self) -> bool {
        self.current
            .borrow()
            .as_ref()
            .is_some_and(|client| client.is_connected())
    }

    /// A connected client, waiting for the watcher if a reconnect is underway.
    pub async fn client(&self) -> Result<Arc<WsClient>, LedgerError> {
        let mut rx = self.current.clone();
        tokio::time::timeout(CONNECTION_WAIT, wait_for_client(&mut rx))
            .await
            .unwrap_or(Err(LedgerError::Disconnected))
    }
}

async fn wait_for_client(
    rx: &mut watch::Receiver<Option<Arc<WsClient>>>,
) -> Result<Arc<WsClient>, LedgerError> {
    loop {
        let live = rx
            .borrow_and_update()
            .as_ref()
            .filter(|client| client.is_connected())
            .map(Arc::clone);
        if let Some(client) = live {
            return Ok(client);
        }
        rx.changed()
            .await
            .map_err(|_| LedgerError::Connection("connection watcher stopped".to_string()))?;
    }
}

impl Drop for LedgerConnection {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

async fn watch_connection(url: String, tx: watch::Sender<Option<Arc<WsClient>>>, mut client: Arc<WsClient>) {
    loop {
        client.on_disconnect().await;
        warn!(%url, "ledger: connection lost, reconnecting");
        tx.send_replace(None);

        let mut attempt = 0;
        client = loop {
            match build_client(&url).await {
                Ok(next) => break Arc::new(next),
                Err(e) => {
                    let delay = reconnect_delay(attempt);
                    warn!(%url, attempt, error = %e, delay_ms = delay.as_millis() as u64, "ledger: reconnect failed");
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
            if tx.is_closed() {
                return;
            }
        };

        info!(%url, attempts = attempt + 1, "ledger: reconnected");
        if tx.send(Some(Arc::clone(&client))).is_err() {
            return;
        }
    }
}
