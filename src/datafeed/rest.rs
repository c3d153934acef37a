//! HTTP client for the history and symbol directory endpoints.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use zeroize::Zeroizing;

use super::{HistorySource, SymbolDirectory};
use crate::Result;
use crate::models::symbol::DirectoryEntry;
use crate::models::{RawBar, SymbolInfo, Timespan};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST adapter serving `/tradingData` and `/symbols`.
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<Zeroizing<String>>,
}

impl RestClient {
    /// Creates a client for the API rooted at `base_url`. When `token` is
    /// set it is sent as a bearer token on every request.
    ///
    /// # Errors
    ///
    /// Returns [`KlineError::Http`](crate::KlineError::Http) if the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, token: Option<Zeroizing<String>>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => request.bearer_auth(token.as_str()),
            None => request,
        }
    }
}

#[async_trait]
impl HistorySource for RestClient {
    async fn history(
        &self,
        symbol: &SymbolInfo,
        timespan: Timespan,
        from: i64,
        to: i64,
    ) -> Result<Vec<RawBar>> {
        let min = from.to_string();
        let max = to.to_string();
        let response = self
            .get("/tradingData")
            .query(&[
                ("symbol", symbol.api_symbol()),
                ("unit", timespan.as_str()),
                ("min", min.as_str()),
                ("max", max.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let bars: Vec<RawBar> = response.json().await?;
        debug!(
            symbol = symbol.api_symbol(),
            unit = timespan.as_str(),
            from,
            to,
            bars = bars.len(),
            "Fetched history"
        );

        Ok(bars)
    }
}

#[async_trait]
impl SymbolDirectory for RestClient {
    async fn search_symbols(&self, query: Option<&str>) -> Result<Vec<SymbolInfo>> {
        let entries: Vec<DirectoryEntry> = self
            .get("/symbols")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let total = entries.len();
        let symbols: Vec<SymbolInfo> = entries
            .into_iter()
            .filter(|entry| matches_query(entry, query))
            .map(SymbolInfo::from)
            .collect();
        debug!(query = ?query, total, matched = symbols.len(), "Searched symbols");

        Ok(symbols)
    }
}

/// Normalizes free text to the directory's ticker shape: lower-case
/// alphanumerics with a dash after the third character (`"USDJPY"` becomes
/// `"usd-jpy"`).
fn normalize_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if cleaned.len() > 3 {
        format!("{}-{}", &cleaned[..3], &cleaned[3..])
    } else {
        cleaned
    }
}

fn matches_query(entry: &DirectoryEntry, query: Option<&str>) -> bool {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return true;
    };

    let ticker = normalize_query(query);
    let raw = query.to_lowercase();

    entry.ticker.to_lowercase().contains(&ticker)
        || entry.name.to_lowercase().contains(&ticker)
        || entry
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(&raw))
}
