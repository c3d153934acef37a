//! Incoming live feed frame parsing.

use tracing::debug;

use crate::models::{Tick, TickMessage};

/// Parses one text frame into a tick for `symbol`.
///
/// Returns `None` for frames that are not JSON, carry no price (status
/// notifications such as `TRADE_COMPLETED`), or quote a different symbol.
pub fn parse_tick_frame(text: &str, symbol: &str) -> Option<Tick> {
    let message: TickMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "Skipping undecodable frame");
            return None;
        }
    };

    let msg_type = message.tpe.clone();
    let Some((frame_symbol, tick)) = message.into_tick() else {
        debug!(msg_type = ?msg_type, "Skipping non-price frame");
        return None;
    };

    if !frame_symbol.eq_ignore_ascii_case(symbol) {
        debug!(
            expected = symbol,
            received = frame_symbol,
            "Skipping frame for another symbol"
        );
        return None;
    }

    Some(tick)
}
