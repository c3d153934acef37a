//! Shared models for market data, periods, and live feed messages.
//!
//! Contains the engine's value types ([`Period`], [`Candle`], [`Tick`]),
//! the upstream record shapes they are normalized from, and the control
//! messages sent to the live price channel.

pub mod candle;
pub mod period;
pub mod symbol;
pub mod tick;

use serde::Serialize;

pub use candle::{Candle, RawBar};
pub use period::{Period, Timespan};
pub use symbol::SymbolInfo;
pub use tick::{LiveTick, Tick, TickMessage};

/// A `subscribe` control message sent once the live channel opens.
#[derive(Debug, Serialize)]
pub struct SubscribeRequest {
    pub action: String,
    pub symbol: String,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl SubscribeRequest {
    pub fn new(symbol: &str, user_id: Option<String>, token: Option<String>) -> Self {
        Self {
            action: "subscribe".to_string(),
            symbol: symbol.to_string(),
            user_id,
            token,
        }
    }
}

/// A row of the engine's output stream to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartEvent {
    /// Replace the whole visible window (after a symbol/period switch).
    Reset {
        symbol: String,
        period: Period,
        candles: Vec<Candle>,
    },
    /// A new candle opened to the right of the last one.
    Append { candle: Candle },
    /// The most recent candle changed in place.
    Update { candle: Candle },
    /// Seed loading started (`true`) or finished (`false`).
    Loading { loading: bool },
}
