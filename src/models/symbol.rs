//! Symbol directory models.

use serde::{Deserialize, Serialize};

/// A tradable symbol as presented to the chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Name the upstream APIs key data by (e.g. `"USD-JPY"`).
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub price_precision: Option<u32>,
    #[serde(default)]
    pub volume_precision: Option<u32>,
    #[serde(default)]
    pub price_currency: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub is_favorite: Option<bool>,
    #[serde(default)]
    pub payout: f64,
}

impl SymbolInfo {
    /// Builds a bare symbol keyed by `short_name`.
    pub fn new(ticker: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            id: None,
            ticker: ticker.into(),
            name: None,
            short_name: Some(short_name.into()),
            exchange: None,
            market: None,
            price_precision: None,
            volume_precision: None,
            price_currency: None,
            kind: None,
            logo: None,
            is_favorite: None,
            payout: 0.0,
        }
    }

    /// The identifier sent to the history and live APIs: the short name
    /// when present, otherwise the ticker.
    pub fn api_symbol(&self) -> &str {
        self.short_name.as_deref().unwrap_or(&self.ticker)
    }
}

/// A record from the `/symbols` directory endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub ticker: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub payout: Option<f64>,
    #[serde(default)]
    pub is_favorite: Option<bool>,
}

impl From<DirectoryEntry> for SymbolInfo {
    fn from(entry: DirectoryEntry) -> Self {
        Self {
            id: Some(entry.id),
            ticker: entry.ticker,
            name: entry.description,
            short_name: Some(entry.name),
            exchange: None,
            market: entry.kind.clone(),
            price_precision: Some(5),
            volume_precision: None,
            price_currency: Some("USD".to_string()),
            kind: entry.kind,
            logo: None,
            is_favorite: entry.is_favorite,
            payout: entry.payout.unwrap_or(0.0),
        }
    }
}
