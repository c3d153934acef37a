//! Application configuration loaded from environment variables.
//!
//! - `KLINE_API_URL` - base URL of the history REST API
//! - `KLINE_WEBSOCKET_URL` - live price WebSocket endpoint
//! - `KLINE_API_TOKEN` - bearer token, also sent as the live feed `token`
//! - `KLINE_USER_ID` - live feed `userId`; requires `KLINE_API_TOKEN`
//! - `KLINE_SYMBOL` / `KLINE_PERIOD` - what the binary opens on start
//! - `KLINE_SEED_CANDLES` / `KLINE_PAGE_SIZE` - history window sizes
//!
//! Empty values are treated as unset.

use zeroize::Zeroizing;

use crate::error::KlineError;
use crate::models::Period;

/// Default history API endpoint.
const DEFAULT_API_URL: &str = "http://localhost:8081";

/// Default live price endpoint.
const DEFAULT_WEBSOCKET_URL: &str = "wss://binary-trading-app-be.onrender.com";

const DEFAULT_SYMBOL: &str = "USD-JPY";
const DEFAULT_PERIOD: &str = "5s";
const DEFAULT_SEED_CANDLES: u32 = 100;
const DEFAULT_PAGE_SIZE: u32 = 60;

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub engine: EngineConfig,
    pub chart: ChartConfig,
}

/// Upstream endpoints and credentials.
#[derive(Debug)]
pub struct FeedConfig {
    pub api_url: String,
    pub websocket_url: String,
    pub api_token: Option<Zeroizing<String>>,
    pub user_id: Option<String>,
}

/// Window sizes used by the aggregation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Trailing windows fetched when a subscription starts.
    pub seed_candles: u32,
    /// Windows per backfill page.
    pub page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed_candles: DEFAULT_SEED_CANDLES,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// What the binary opens on start.
#[derive(Debug)]
pub struct ChartConfig {
    pub symbol: String,
    pub period: Period,
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`KlineError::Config`] if a count is not a positive integer, the
/// period label does not parse, or `KLINE_USER_ID` is set without
/// `KLINE_API_TOKEN`.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let api_url = non_empty_var("KLINE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let websocket_url = non_empty_var("KLINE_WEBSOCKET_URL")
        .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());

    let api_token = non_empty_var("KLINE_API_TOKEN").map(Zeroizing::new);
    let user_id = non_empty_var("KLINE_USER_ID");

    if user_id.is_some() && api_token.is_none() {
        return Err(KlineError::Config(
            "KLINE_USER_ID is set but KLINE_API_TOKEN is missing".to_string(),
        ));
    }

    let symbol = non_empty_var("KLINE_SYMBOL").unwrap_or_else(|| DEFAULT_SYMBOL.to_string());
    let period_label =
        non_empty_var("KLINE_PERIOD").unwrap_or_else(|| DEFAULT_PERIOD.to_string());
    let period: Period = period_label
        .parse()
        .map_err(|e| KlineError::Config(format!("KLINE_PERIOD: {e}")))?;

    let engine = EngineConfig {
        seed_candles: positive_var("KLINE_SEED_CANDLES", DEFAULT_SEED_CANDLES)?,
        page_size: positive_var("KLINE_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
    };

    Ok(AppConfig {
        feed: FeedConfig {
            api_url,
            websocket_url,
            api_token,
            user_id,
        },
        engine,
        chart: ChartConfig { symbol, period },
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Reads a positive integer variable, falling back to `default` when unset.
fn positive_var(name: &str, default: u32) -> crate::Result<u32> {
    let Some(raw) = non_empty_var(name) else {
        return Ok(default);
    };

    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(KlineError::Config(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 8] = [
        "KLINE_API_URL",
        "KLINE_WEBSOCKET_URL",
        "KLINE_API_TOKEN",
        "KLINE_USER_ID",
        "KLINE_SYMBOL",
        "KLINE_PERIOD",
        "KLINE_SEED_CANDLES",
        "KLINE_PAGE_SIZE",
    ];

    /// Helper that temporarily sets env vars, runs `f`, then restores originals.
    ///
    /// Variables from [`VARS`] not listed in `vars` are cleared for the
    /// duration of `f`.
    ///
    /// # Safety
    ///
    /// Tests using this helper must run with `--test-threads=1` or otherwise
    /// ensure no other threads read these env vars concurrently.
    fn with_env<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
        let originals: Vec<(&str, Option<String>)> =
            VARS.iter().map(|k| (*k, std::env::var(k).ok())).collect();

        for k in VARS {
            let value = vars.iter().find(|(name, _)| *name == k).and_then(|(_, v)| *v);
            // SAFETY: config tests run single-threaded (see test runner config).
            unsafe {
                match value {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }

        f();

        for (k, original) in originals {
            // SAFETY: restoring original values, same single-threaded context.
            unsafe {
                match original {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn defaults_without_env_vars() {
        with_env(&[], || {
            let config = fetch_config().unwrap();
            assert_eq!(config.feed.api_url, DEFAULT_API_URL);
            assert_eq!(config.feed.websocket_url, DEFAULT_WEBSOCKET_URL);
            assert!(config.feed.api_token.is_none());
            assert!(config.feed.user_id.is_none());
            assert_eq!(config.chart.symbol, "USD-JPY");
            assert_eq!(config.chart.period.label(), "5s");
            assert_eq!(config.engine, EngineConfig::default());
        });
    }

    #[test]
    fn loads_credentials_and_sizes_from_env() {
        with_env(
            &[
                ("KLINE_API_TOKEN", Some("test-token")),
                ("KLINE_USER_ID", Some("user-1")),
                ("KLINE_SEED_CANDLES", Some("250")),
                ("KLINE_PAGE_SIZE", Some("30")),
                ("KLINE_PERIOD", Some("15m")),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.feed.api_token.as_deref().map(String::as_str), Some("test-token"));
                assert_eq!(config.feed.user_id.as_deref(), Some("user-1"));
                assert_eq!(config.engine.seed_candles, 250);
                assert_eq!(config.engine.page_size, 30);
                assert_eq!(config.chart.period.multiplier(), 15);
            },
        );
    }

    #[test]
    fn rejects_user_id_without_token() {
        with_env(&[("KLINE_USER_ID", Some("user-only"))], || {
            let err = fetch_config().unwrap_err();
            assert!(err.to_string().contains("KLINE_API_TOKEN is missing"));
        });
    }

    #[test]
    fn rejects_zero_and_garbage_sizes() {
        with_env(&[("KLINE_PAGE_SIZE", Some("0"))], || {
            assert!(fetch_config().is_err());
        });
        with_env(&[("KLINE_SEED_CANDLES", Some("lots"))], || {
            assert!(fetch_config().is_err());
        });
    }

    #[test]
    fn rejects_unknown_period() {
        with_env(&[("KLINE_PERIOD", Some("7q"))], || {
            let err = fetch_config().unwrap_err();
            assert!(err.to_string().contains("KLINE_PERIOD"));
        });
    }

    #[test]
    fn empty_values_treated_as_absent() {
        with_env(
            &[
                ("KLINE_API_TOKEN", Some("")),
                ("KLINE_WEBSOCKET_URL", Some("")),
                ("KLINE_PAGE_SIZE", Some("")),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.feed.websocket_url, DEFAULT_WEBSOCKET_URL);
                assert!(config.feed.api_token.is_none());
                assert_eq!(config.engine.page_size, DEFAULT_PAGE_SIZE);
            },
        );
    }
}
