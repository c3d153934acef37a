//! Shared test utilities: an in-memory datafeed and fixture builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use klinefeed::KlineError;
use klinefeed::datafeed::{HistorySource, LiveFeed, TickStream};
use klinefeed::models::{LiveTick, Period, RawBar, SymbolInfo, Tick, Timespan};
use rust_decimal::Decimal;
use tokio::sync::{Semaphore, mpsc};

/// Live price WebSocket endpoint used by the network tests.
pub const LIVE_WS_URL: &str = "wss://binary-trading-app-be.onrender.com";

/// One interaction with the mock, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCall {
    History(String),
    Subscribe(String, u64),
    Unsubscribe(String),
}

/// History source and live feed backed by in-memory bars.
///
/// History requests return the stored bars for the symbol whose timestamp
/// lies in `[from, to]`. When built with [`MockDatafeed::gated`], each
/// history request waits for a permit from [`MockDatafeed::release`].
#[derive(Default)]
pub struct MockDatafeed {
    bars: Mutex<HashMap<String, Vec<RawBar>>>,
    failing: Mutex<bool>,
    calls: Mutex<Vec<FeedCall>>,
    senders: Mutex<Vec<(u64, mpsc::UnboundedSender<LiveTick>)>>,
    gate: Option<Semaphore>,
}

impl MockDatafeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    pub fn with_bars(symbol: &str, bars: Vec<RawBar>) -> Arc<Self> {
        let feed = Self::default();
        feed.bars.lock().unwrap().insert(symbol.to_string(), bars);
        Arc::new(feed)
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Lets `permits` gated history requests proceed.
    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> Vec<FeedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Sends a tick through the most recent subscription. Returns `false`
    /// if nothing is subscribed or the stream was dropped.
    pub fn push(&self, tick: Tick) -> bool {
        let senders = self.senders.lock().unwrap();
        match senders.last() {
            Some((generation, tx)) => tx
                .send(LiveTick {
                    generation: *generation,
                    tick,
                })
                .is_ok(),
            None => false,
        }
    }

    /// Sends a tick through the subscription opened for `generation`.
    pub fn push_to(&self, generation: u64, tick: Tick) -> bool {
        let senders = self.senders.lock().unwrap();
        senders
            .iter()
            .find(|(g, _)| *g == generation)
            .is_some_and(|(_, tx)| tx.send(LiveTick { generation, tick }).is_ok())
    }
}

#[async_trait]
impl HistorySource for MockDatafeed {
    async fn history(
        &self,
        symbol: &SymbolInfo,
        _timespan: Timespan,
        from: i64,
        to: i64,
    ) -> klinefeed::Result<Vec<RawBar>> {
        self.calls
            .lock()
            .unwrap()
            .push(FeedCall::History(symbol.api_symbol().to_string()));

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .expect("gate closed")
                .forget();
        }

        if *self.failing.lock().unwrap() {
            return Err(KlineError::WebSocket(tungstenite::Error::ConnectionClosed));
        }

        Ok(self
            .bars
            .lock()
            .unwrap()
            .get(symbol.api_symbol())
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= from && b.timestamp <= to)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl LiveFeed for MockDatafeed {
    fn subscribe(&self, symbol: &SymbolInfo, _period: &Period, generation: u64) -> TickStream {
        self.calls
            .lock()
            .unwrap()
            .push(FeedCall::Subscribe(symbol.api_symbol().to_string(), generation));
        let (tx, stream) = TickStream::channel(generation);
        self.senders.lock().unwrap().push((generation, tx));
        stream
    }

    fn unsubscribe(&self, symbol: &SymbolInfo, _period: &Period) {
        self.calls
            .lock()
            .unwrap()
            .push(FeedCall::Unsubscribe(symbol.api_symbol().to_string()));
    }
}

pub fn symbol(name: &str) -> SymbolInfo {
    SymbolInfo::new(format!("C:{name}"), name)
}

pub fn period(label: &str) -> Period {
    label.parse().expect("valid period label")
}

/// A bar whose four prices all equal `price`, with volume 1.
pub fn bar(timestamp: i64, price: Decimal) -> RawBar {
    RawBar {
        timestamp,
        open: price,
        high: price,
        low: price,
        close: price,
        volume: Decimal::ONE,
    }
}

/// One-minute bars at every minute in `[start, end]`, priced by minute index.
pub fn minute_bars(start: i64, end: i64) -> Vec<RawBar> {
    (start..=end)
        .step_by(60_000)
        .map(|t| bar(t, Decimal::from(t / 60_000)))
        .collect()
}
