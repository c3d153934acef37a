//! OHLCV candle and upstream history bar models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV candle covering one period window.
///
/// `timestamp` is the window start in milliseconds since the Unix epoch
/// (UTC). A well-formed candle satisfies `low <= open, close <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// A candle whose four prices all equal `price`.
    pub fn flat(timestamp: i64, price: Decimal, volume: Decimal) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// Checks the OHLC ordering invariant.
    pub fn is_consistent(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
            && self.volume >= Decimal::ZERO
    }
}

/// A historical bar as served by the upstream history API, at the
/// source's native granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RawBar {
    /// Bar start time (wire name: `"date"`), milliseconds since epoch.
    #[serde(rename = "date")]
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}

impl From<RawBar> for Candle {
    fn from(bar: RawBar) -> Self {
        Self {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}
