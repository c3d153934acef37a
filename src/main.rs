use std::sync::Arc;

use klinefeed::KlineError;
use klinefeed::config::fetch_config;
use klinefeed::coordinator::SubscriptionCoordinator;
use klinefeed::credentials::populate_env_from_keychain;
use klinefeed::datafeed::{RestClient, SymbolDirectory, WebSocketFeed};
use klinefeed::models::{ChartEvent, SymbolInfo};
use klinefeed::session::ChartSession;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), KlineError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    populate_env_from_keychain();
    let app_config = fetch_config()?;

    let rest = Arc::new(RestClient::new(
        &app_config.feed.api_url,
        app_config.feed.api_token.clone(),
    )?);
    let feed = Arc::new(WebSocketFeed::new(
        app_config.feed.websocket_url.clone(),
        app_config.feed.user_id.clone(),
        app_config.feed.api_token.clone(),
    ));

    let symbol = match rest.search_symbols(Some(app_config.chart.symbol.as_str())).await {
        Ok(found) if !found.is_empty() => found[0].clone(),
        Ok(_) => {
            warn!(symbol = %app_config.chart.symbol, "Symbol not in directory, using as given");
            SymbolInfo::new(app_config.chart.symbol.clone(), app_config.chart.symbol.clone())
        }
        Err(e) => {
            warn!("Symbol lookup failed: {e}");
            SymbolInfo::new(app_config.chart.symbol.clone(), app_config.chart.symbol.clone())
        }
    };

    let (coordinator, mut events) = SubscriptionCoordinator::new(rest, feed, app_config.engine);
    let handle = ChartSession::spawn(coordinator);
    handle.switch_to(symbol, app_config.chart.period).await?;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(ChartEvent::Reset { symbol, period, candles }) => {
                        info!(%symbol, %period, candles = candles.len(), "Chart reset");
                    }
                    Some(ChartEvent::Append { candle }) => {
                        info!(time = candle.timestamp, open = %candle.open, close = %candle.close, "New candle");
                    }
                    Some(ChartEvent::Update { candle }) => {
                        info!(
                            time = candle.timestamp,
                            high = %candle.high,
                            low = %candle.low,
                            close = %candle.close,
                            volume = %candle.volume,
                            "Candle updated"
                        );
                    }
                    Some(ChartEvent::Loading { loading }) => {
                        info!(loading, "Loading state changed");
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                handle.dispose();
                break;
            }
        }
    }

    Ok(())
}
