//! Live price tick models.

use rust_decimal::Decimal;
use serde::Deserialize;

/// A single observed trade/quote from the live feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Observation time, milliseconds since epoch.
    pub timestamp: i64,
    pub price: Decimal,
    /// Incremental volume carried by this tick.
    pub volume: Decimal,
}

impl Tick {
    pub fn new(timestamp: i64, price: Decimal, volume: Decimal) -> Self {
        Self {
            timestamp,
            price,
            volume,
        }
    }
}

/// A tick tagged with the subscription generation that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveTick {
    pub generation: u64,
    pub tick: Tick,
}

/// A text frame from the live price channel.
///
/// Price frames look like `{"symbol":"USD-JPY","price":151.2,"time":1700000000000,"volume":3}`.
/// The channel also carries other notifications (e.g. `"type":"TRADE_COMPLETED"`)
/// which lack a symbol or price.
#[derive(Debug, Clone, Deserialize)]
pub struct TickMessage {
    pub symbol: Option<String>,
    pub price: Option<Decimal>,
    pub time: Option<i64>,
    pub volume: Option<Decimal>,
    #[serde(rename = "type")]
    pub tpe: Option<String>,
}

impl TickMessage {
    /// Converts a price frame into `(symbol, tick)`.
    ///
    /// Returns `None` for frames without a symbol, a non-zero price, or a
    /// time. A missing or negative volume counts as zero.
    pub fn into_tick(self) -> Option<(String, Tick)> {
        let symbol = self.symbol.filter(|s| !s.is_empty())?;
        let price = self.price.filter(|p| !p.is_zero())?;
        let time = self.time?;
        let volume = self
            .volume
            .filter(|v| v.is_sign_positive())
            .unwrap_or(Decimal::ZERO);

        Some((symbol, Tick::new(time, price, volume)))
    }
}
