//! Voter token balances from the paginated REST balance service.

use std::collections::HashSet;

use async_trait::async_trait;
use eddy_core::address::account_key;
use eddy_core::constants::BALANCE_PAGE_SIZE;
use eddy_core::error::FetchError;
use eddy_core::traits::BalanceSource;
use eddy_core::types::Balances;
use serde_json::Value;
use tracing::{debug, warn};

use crate::lenient::{f64_field, str_field, u64_field};
use crate::paginate::{Page, paginate};
use crate::retry::HttpFetcher;

#[derive(Debug, Clone)]
pub struct RestBalanceSource {
    fetcher: HttpFetcher,
    url: String,
    page_size: usize,
}

impl RestBalanceSource {
    /// `base_url` is the service root; pages are read from `{base_url}/balances`.
    pub fn new(fetcher: HttpFetcher, base_url: &str) -> Self {
        Self {
            fetcher,
            url: format!("{}/balances", base_url.trim_end_matches('/')),
            page_size: BALANCE_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn fetch_page(&self, index: u32) -> Result<Page<(String, f64)>, FetchError> {
        let page_number = index + 1;
        let query = [
            ("page", page_number.to_string()),
            ("page_size", self.page_size.to_string()),
            ("order", "desc".to_string()),
        ];
        let body: Value = self.fetcher.get_json(&self.url, &query).await?;
        parse_balance_page(&body, page_number, &self.url)
    }
}

#[async_trait]
impl BalanceSource for RestBalanceSource {
    async fn fetch_balances(&self, addresses: &[String]) -> Result<Balances, FetchError> {
        if addresses.is_empty() {
            return Ok(Balances::new());
        }
        let wanted: HashSet<&str> = addresses.iter().map(String::as_str).collect();
        let all = paginate(&self.url, self.page_size, |index| self.fetch_page(index)).await?;
        let total = all.len();

        let balances: Balances = all
            .into_iter()
            .filter(|(address, _)| wanted.contains(address.as_str()))
            .collect();
        debug!(listed = total, matched = balances.len(), requested = addresses.len(), "balances: fetched");
        Ok(balances)
    }
}

/// Parse one `{balances, pagination}` page.
///
/// `page_number` is the 1-based page requested. The returned page reports a
/// total that ends the walk once `current_page == total_pages`.
pub fn parse_balance_page(body: &Value, page_number: u32, url: &str) -> Result<Page<(String, f64)>, FetchError> {
    let records = body
        .get("balances")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Decode {
            url: url.to_string(),
            reason: "missing `balances` list".to_string(),
        })?;

    let items = records
        .iter()
        .filter_map(|record| {
            let address = str_field(record, "address").and_then(account_key);
            let balance = f64_field(record, "balance");
            match (address, balance) {
                (Some(address), Some(balance)) if balance >= 0.0 => Some((address, balance)),
                _ => {
                    warn!(record = %record, "balances: skipping malformed record");
                    None
                }
            }
        })
        .collect();

    let pagination = body.get("pagination");
    let total_pages = pagination.and_then(|p| u64_field(p, "total_pages")).map(|total| {
        let current = pagination
            .and_then(|p| u64_field(p, "current_page"))
            .unwrap_or(u64::from(page_number));
        // Index-based total: the walk stops once the reported page is the last.
        if current >= total {
            page_number
        } else {
            u32::try_from(total).unwrap_or(u32::MAX)
        }
    });

    Ok(Page {
        items,
        fetched: records.len(),
        total_pages,
    })
}
