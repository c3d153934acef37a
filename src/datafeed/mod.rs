//! Collaborator contracts for the external market-data services.
//!
//! The engine talks to three services:
//! - [`HistorySource`] - historical bars at the source's native granularity
//! - [`LiveFeed`] - live price ticks for one subscription at a time
//! - [`SymbolDirectory`] - symbol lookup for pickers
//!
//! Concrete adapters live in [`rest`] (HTTP history and directory) and
//! [`websocket`] (live ticks).

pub mod rest;
pub mod websocket;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;
use crate::models::{LiveTick, Period, RawBar, SymbolInfo, Timespan};

pub use rest::RestClient;
pub use websocket::WebSocketFeed;

/// Source of historical bars.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetches bars for `symbol` at the native granularity of `timespan`
    /// whose start lies in `[from, to]`.
    ///
    /// # Errors
    ///
    /// Returns a [`KlineError`](crate::KlineError) on transport or decode
    /// failure.
    async fn history(
        &self,
        symbol: &SymbolInfo,
        timespan: Timespan,
        from: i64,
        to: i64,
    ) -> Result<Vec<RawBar>>;
}

/// Symbol lookup.
#[async_trait]
pub trait SymbolDirectory: Send + Sync {
    /// Lists symbols matching `query`, or every symbol when `query` is
    /// `None` or empty.
    ///
    /// # Errors
    ///
    /// Returns a [`KlineError`](crate::KlineError) on transport or decode
    /// failure.
    async fn search_symbols(&self, query: Option<&str>) -> Result<Vec<SymbolInfo>>;
}

/// Live tick registration.
///
/// At most one subscription is active per chart view. Subscribing hands back
/// a [`TickStream`]; dropping the stream closes the channel so nothing more
/// can be delivered through it.
pub trait LiveFeed: Send + Sync {
    /// Starts delivering ticks for `symbol`, tagged with `generation`.
    fn subscribe(&self, symbol: &SymbolInfo, period: &Period, generation: u64) -> TickStream;

    /// Stops the subscription for `(symbol, period)`. Fire-and-forget.
    fn unsubscribe(&self, symbol: &SymbolInfo, period: &Period);
}

/// Receiving end of one live subscription.
#[derive(Debug)]
pub struct TickStream {
    generation: u64,
    rx: mpsc::UnboundedReceiver<LiveTick>,
}

impl TickStream {
    pub fn new(generation: u64, rx: mpsc::UnboundedReceiver<LiveTick>) -> Self {
        Self { generation, rx }
    }

    /// Creates a stream plus the sender a feed adapter pushes ticks into.
    pub fn channel(generation: u64) -> (mpsc::UnboundedSender<LiveTick>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(generation, rx))
    }

    /// The generation this stream was opened for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Waits for the next tick. `None` once the feed side has hung up.
    pub async fn recv(&mut self) -> Option<LiveTick> {
        self.rx.recv().await
    }
}
