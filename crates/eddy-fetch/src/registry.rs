//! Miner registry: uid ↔ hotkey ↔ linked settlement address.

use async_trait::async_trait;
use eddy_core::address::normalize_address;
use eddy_core::error::FetchError;
use eddy_core::traits::RegistrySource;
use eddy_core::types::{MinerEntry, MinerRegistry, Uid};
use serde_json::Value;
use tracing::{debug, warn};

use crate::lenient::{str_field, u64_field};
use crate::retry::HttpFetcher;

#[derive(Debug, Clone)]
pub struct RestRegistrySource {
    fetcher: HttpFetcher,
    url: String,
}

impl RestRegistrySource {
    /// `base_url` is the service root; the list is read from `{base_url}/miners`.
    pub fn new(fetcher: HttpFetcher, base_url: &str) -> Self {
        Self {
            fetcher,
            url: format!("{}/miners", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl RegistrySource for RestRegistrySource {
    async fn fetch_registry(&self) -> Result<MinerRegistry, FetchError> {
        let body: Value = self.fetcher.get_json(&self.url, &[]).await?;
        let registry = parse_registry(&body, &self.url)?;
        debug!(
            miners = registry.len(),
            linked = registry.linked_uids().len(),
            "registry: fetched"
        );
        Ok(registry)
    }
}

/// Parse the ordered miner list. List position is the uid.
///
/// Accepts a bare array or `{"miners": [...]}`. Entries whose explicit `uid`
/// disagrees with their position, or that lack a hotkey, are skipped. An
/// unparseable linked address leaves the miner unlinked.
pub fn parse_registry(body: &Value, url: &str) -> Result<MinerRegistry, FetchError> {
    let list = match body {
        Value::Array(items) => items,
        other => other
            .get("miners")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::Decode {
                url: url.to_string(),
                reason: "expected a miner list".to_string(),
            })?,
    };

    let mut entries = Vec::with_capacity(list.len());
    for (position, record) in list.iter().enumerate() {
        let Ok(uid) = Uid::try_from(position) else {
            warn!(position, "registry: list longer than the uid space, truncating");
            break;
        };
        if let Some(explicit) = u64_field(record, "uid") {
            if explicit != u64::from(uid) {
                warn!(position, explicit, "registry: uid disagrees with list position, skipping");
                continue;
            }
        }
        let Some(hotkey) = str_field(record, "hotkey") else {
            warn!(uid, "registry: entry without hotkey, skipping");
            continue;
        };
        let linked_address = match str_field(record, "linked_address") {
            None => None,
            Some(raw) => match normalize_address(raw) {
                Ok(addr) => Some(addr),
                Err(e) => {
                    warn!(uid, %hotkey, address = raw, error = %e, "registry: invalid linked address, treating as unlinked");
                    None
                }
            },
        };
        entries.push(MinerEntry {
            uid,
            hotkey: hotkey.to_string(),
            linked_address,
        });
    }
    Ok(MinerRegistry::new(entries))
}
