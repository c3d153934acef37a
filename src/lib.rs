//! OHLCV candle aggregation and reconciliation engine.
//!
//! Builds candles of an arbitrary [`Period`](models::Period) from a history
//! REST API and a live price WebSocket feed, and keeps the most recent
//! candle current as ticks arrive. History bars are fetched at the source's
//! native granularity and folded into the requested period; live ticks are
//! merged into the open candle; older pages are loaded on demand.

pub mod aggregate;
pub mod backfill;
pub mod boundary;
pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod datafeed;
pub mod error;
pub mod history;
pub mod live;
pub mod models;
pub mod session;

pub use error::{KlineError, Result};
