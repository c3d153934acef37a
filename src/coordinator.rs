//! Subscription lifecycle for one chart view.
//!
//! A switch to a new `(symbol, period)` runs in a fixed order:
//!
//! 1. unsubscribe the previous pair and stop delivering its ticks
//! 2. mark the view as loading
//! 3. fetch the seed window of history
//! 4. reset the view to the seed and seed the live merger with its last candle
//! 5. subscribe to live ticks under a fresh generation
//! 6. clear the loading flag
//!
//! Every subscription carries a generation number. Ticks and history
//! results tagged with an older generation are discarded, so nothing from
//! a previous pair can reach the current view.
//!
//! The coordinator itself never awaits between steps 2 and 4; the split
//! [`begin_switch`](SubscriptionCoordinator::begin_switch) /
//! [`finish_switch`](SubscriptionCoordinator::finish_switch) pair lets a
//! driver such as [`ChartSession`](crate::session::ChartSession) keep
//! processing commands while the seed is in flight.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backfill::{BackfillPaginator, BackfillStep, Page, PageWindow};
use crate::boundary::range;
use crate::config::EngineConfig;
use crate::datafeed::{HistorySource, LiveFeed, TickStream};
use crate::history::HistoryFetcher;
use crate::live::{LiveMerger, MergeOutcome};
use crate::models::{Candle, ChartEvent, LiveTick, Period, SymbolInfo};

/// Source of "now" in epoch milliseconds.
pub type Clock = fn() -> i64;

fn system_clock() -> i64 {
    Utc::now().timestamp_millis()
}

/// The currently selected pair and its live state.
#[derive(Debug)]
pub struct SubscriptionState {
    symbol: SymbolInfo,
    period: Period,
    generation: u64,
    merger: LiveMerger,
    loading: bool,
    subscribed: bool,
}

impl SubscriptionState {
    fn new(symbol: SymbolInfo, period: Period, generation: u64) -> Self {
        Self {
            merger: LiveMerger::new(period.clone()),
            symbol,
            period,
            generation,
            loading: true,
            subscribed: false,
        }
    }

    pub fn symbol(&self) -> &SymbolInfo {
        &self.symbol
    }

    pub fn period(&self) -> &Period {
        &self.period
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn open_candle(&self) -> Option<&Candle> {
        self.merger.open_candle()
    }

    pub fn last_boundary(&self) -> Option<i64> {
        self.merger.last_boundary()
    }

    pub fn data_quality_warnings(&self) -> u64 {
        self.merger.data_quality_warnings()
    }
}

/// Seed history to fetch for a switch that has started.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedRequest {
    pub generation: u64,
    pub symbol: SymbolInfo,
    pub period: Period,
    pub from: i64,
    pub to: i64,
}

/// A backfill page to fetch for the current subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub generation: u64,
    pub symbol: SymbolInfo,
    pub period: Period,
    pub window: PageWindow,
}

/// What [`SubscriptionCoordinator::begin_load_more`] decided.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadMore {
    /// Fetch this page, then call
    /// [`complete_load_more`](SubscriptionCoordinator::complete_load_more).
    Fetch(PageRequest),
    /// Answer immediately with this page.
    Ready(Page),
    /// Nothing to page through, a switch is loading, or a page is already
    /// in flight.
    Rejected,
}

/// Orders subscribe, unsubscribe and seed operations for one chart view and
/// routes live ticks into the open candle.
pub struct SubscriptionCoordinator {
    feed: Arc<dyn LiveFeed>,
    history: HistoryFetcher,
    config: EngineConfig,
    clock: Clock,
    generation: u64,
    state: Option<SubscriptionState>,
    ticks: Option<TickStream>,
    paginator: Option<BackfillPaginator>,
    pending: Option<(SymbolInfo, Period)>,
    events: mpsc::UnboundedSender<ChartEvent>,
}

impl SubscriptionCoordinator {
    /// Creates an idle coordinator and the receiver its [`ChartEvent`]s are
    /// published on.
    pub fn new(
        history: Arc<dyn HistorySource>,
        feed: Arc<dyn LiveFeed>,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ChartEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            feed,
            history: HistoryFetcher::new(history),
            config,
            clock: system_clock,
            generation: 0,
            state: None,
            ticks: None,
            paginator: None,
            pending: None,
            events,
        };
        (coordinator, rx)
    }

    /// Replaces the wall clock used to place the seed window.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> Option<&SubscriptionState> {
        self.state.as_ref()
    }

    /// Generation of the most recent switch.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.loading)
    }

    pub fn open_candle(&self) -> Option<&Candle> {
        self.state.as_ref().and_then(SubscriptionState::open_candle)
    }

    pub fn history(&self) -> &HistoryFetcher {
        &self.history
    }

    /// Starts switching the view to `(symbol, period)`.
    ///
    /// Returns the seed window to fetch, or `None` when another switch is
    /// still loading. In that case the target is remembered and replaces
    /// any earlier deferred target; it runs once the loading switch
    /// finishes.
    pub fn begin_switch(&mut self, symbol: SymbolInfo, period: Period) -> Option<SeedRequest> {
        if self.is_loading() {
            debug!(
                symbol = symbol.api_symbol(),
                period = %period,
                "Switch deferred until current seed completes"
            );
            self.pending = Some((symbol, period));
            return None;
        }

        Some(self.start_switch(symbol, period))
    }

    fn start_switch(&mut self, symbol: SymbolInfo, period: Period) -> SeedRequest {
        let was_loading = self.is_loading();

        if let Some(previous) = self.state.take()
            && previous.subscribed
        {
            self.feed.unsubscribe(&previous.symbol, &previous.period);
            debug!(
                symbol = previous.symbol.api_symbol(),
                period = %previous.period,
                "Unsubscribed"
            );
        }
        self.ticks = None;
        self.generation += 1;

        self.paginator = Some(BackfillPaginator::new(
            symbol.clone(),
            period.clone(),
            self.config.page_size,
        ));
        self.state = Some(SubscriptionState::new(
            symbol.clone(),
            period.clone(),
            self.generation,
        ));

        if !was_loading {
            emit(&self.events, ChartEvent::Loading { loading: true });
        }

        let (from, to) = range(&period, (self.clock)(), self.config.seed_candles);
        info!(
            symbol = symbol.api_symbol(),
            period = %period,
            generation = self.generation,
            from,
            to,
            "Switching subscription"
        );

        SeedRequest {
            generation: self.generation,
            symbol,
            period,
            from,
            to,
        }
    }

    /// Completes the switch started for `request` with its seed candles.
    ///
    /// A result for a superseded generation is discarded. When a deferred
    /// target is waiting, the seed is discarded too and the returned request
    /// starts the switch to that target instead.
    pub fn finish_switch(&mut self, request: &SeedRequest, candles: Vec<Candle>) -> Option<SeedRequest> {
        if request.generation != self.generation {
            debug!(
                generation = request.generation,
                current = self.generation,
                "Discarding stale seed"
            );
            return None;
        }

        if let Some((symbol, period)) = self.pending.take() {
            debug!(
                symbol = request.symbol.api_symbol(),
                period = %request.period,
                "Seed superseded by a newer switch"
            );
            return Some(self.start_switch(symbol, period));
        }

        let state = self.state.as_mut()?;

        state.merger.seed(candles.last().copied());
        let seeded = candles.len();
        emit(
            &self.events,
            ChartEvent::Reset {
                symbol: state.symbol.api_symbol().to_string(),
                period: state.period.clone(),
                candles,
            },
        );

        self.ticks = Some(
            self.feed
                .subscribe(&state.symbol, &state.period, state.generation),
        );
        state.subscribed = true;
        state.loading = false;
        emit(&self.events, ChartEvent::Loading { loading: false });

        info!(
            symbol = state.symbol.api_symbol(),
            period = %state.period,
            generation = state.generation,
            candles = seeded,
            "Subscribed"
        );
        None
    }

    /// Switches to `(symbol, period)` and waits for the seed to load.
    pub async fn switch_to(&mut self, symbol: SymbolInfo, period: Period) {
        let mut next = self.begin_switch(symbol, period);
        while let Some(request) = next {
            let candles = self
                .history
                .fetch(&request.symbol, &request.period, request.from, request.to)
                .await;
            next = self.finish_switch(&request, candles);
        }
    }

    /// Waits for the next tick of the active subscription.
    ///
    /// Never resolves while nothing is subscribed.
    pub async fn next_tick(&mut self) -> LiveTick {
        loop {
            let Some(stream) = self.ticks.as_mut() else {
                return std::future::pending().await;
            };

            match stream.recv().await {
                Some(tick) => return tick,
                None => {
                    warn!(generation = stream.generation(), "Live feed closed");
                    self.ticks = None;
                }
            }
        }
    }

    /// Merges a live tick into the open candle and publishes the result.
    ///
    /// Returns `None` when the tick was discarded because it belongs to a
    /// previous subscription or the seed is still loading.
    pub fn handle_tick(&mut self, live: LiveTick) -> Option<MergeOutcome> {
        let state = self.state.as_mut()?;

        if live.generation != state.generation || !state.subscribed || state.loading {
            debug!(
                generation = live.generation,
                current = state.generation,
                "Discarding tick from inactive subscription"
            );
            return None;
        }

        let outcome = state.merger.merge(&live.tick);
        match outcome {
            MergeOutcome::Append(candle) => emit(&self.events, ChartEvent::Append { candle }),
            MergeOutcome::Update(candle) => emit(&self.events, ChartEvent::Update { candle }),
            MergeOutcome::Dropped(_) => {}
        }
        Some(outcome)
    }

    /// Starts loading the page preceding `oldest_loaded`.
    pub fn begin_load_more(&mut self, oldest_loaded: i64) -> LoadMore {
        if self.is_loading() {
            debug!(oldest_loaded, "Backfill rejected while seed is loading");
            return LoadMore::Rejected;
        }
        let Some(paginator) = self.paginator.as_mut() else {
            return LoadMore::Rejected;
        };

        match paginator.begin(oldest_loaded) {
            BackfillStep::Busy => LoadMore::Rejected,
            BackfillStep::Exhausted => LoadMore::Ready(Page {
                candles: Vec::new(),
                exhausted: true,
            }),
            BackfillStep::Fetch(window) => LoadMore::Fetch(PageRequest {
                generation: self.generation,
                symbol: paginator.symbol().clone(),
                period: paginator.period().clone(),
                window,
            }),
        }
    }

    /// Completes the page started for `request`. `None` if the view has
    /// switched since.
    pub fn complete_load_more(&mut self, request: &PageRequest, candles: Vec<Candle>) -> Option<Page> {
        if request.generation != self.generation {
            debug!(
                generation = request.generation,
                current = self.generation,
                "Discarding stale backfill page"
            );
            return None;
        }

        self.paginator
            .as_mut()
            .map(|paginator| paginator.complete(&request.window, candles))
    }

    /// Loads the page preceding `oldest_loaded`. `None` when rejected.
    pub async fn load_more(&mut self, oldest_loaded: i64) -> Option<Page> {
        match self.begin_load_more(oldest_loaded) {
            LoadMore::Rejected => None,
            LoadMore::Ready(page) => Some(page),
            LoadMore::Fetch(request) => {
                let candles = self
                    .history
                    .fetch(
                        &request.symbol,
                        &request.period,
                        request.window.from,
                        request.window.to,
                    )
                    .await;
                self.complete_load_more(&request, candles)
            }
        }
    }

    /// Unsubscribes and discards all state. Any in-flight seed or page
    /// result is discarded when it arrives.
    pub fn dispose(&mut self) {
        self.pending = None;
        self.ticks = None;
        self.paginator = None;

        if let Some(state) = self.state.take() {
            if state.subscribed {
                self.feed.unsubscribe(&state.symbol, &state.period);
            }
            info!(
                symbol = state.symbol.api_symbol(),
                period = %state.period,
                "Disposed subscription"
            );
        }
        self.generation += 1;
    }
}

/// Publishes `event`. A dropped receiver only means nobody is watching.
fn emit(events: &mpsc::UnboundedSender<ChartEvent>, event: ChartEvent) {
    if events.send(event).is_err() {
        debug!("Chart event dropped, receiver closed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::{RawBar, Tick, Timespan};

    struct NoHistory;

    #[async_trait]
    impl HistorySource for NoHistory {
        async fn history(
            &self,
            _symbol: &SymbolInfo,
            _timespan: Timespan,
            _from: i64,
            _to: i64,
        ) -> crate::Result<Vec<RawBar>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct RecordingFeed {
        calls: Mutex<Vec<String>>,
    }

    impl LiveFeed for RecordingFeed {
        fn subscribe(&self, symbol: &SymbolInfo, period: &Period, generation: u64) -> TickStream {
            self.calls
                .lock()
                .unwrap()
                .push(format!("sub {} {period} {generation}", symbol.api_symbol()));
            TickStream::channel(generation).1
        }

        fn unsubscribe(&self, symbol: &SymbolInfo, period: &Period) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("unsub {} {period}", symbol.api_symbol()));
        }
    }

    fn coordinator() -> (
        SubscriptionCoordinator,
        Arc<RecordingFeed>,
        mpsc::UnboundedReceiver<ChartEvent>,
    ) {
        let feed = Arc::new(RecordingFeed::default());
        let (c, rx) = SubscriptionCoordinator::new(Arc::new(NoHistory), feed.clone(), EngineConfig::default());
        (c.with_clock(|| 600_000), feed, rx)
    }

    fn usd_jpy() -> SymbolInfo {
        SymbolInfo::new("C:USD-JPY", "USD-JPY")
    }

    fn eur_usd() -> SymbolInfo {
        SymbolInfo::new("C:EUR-USD", "EUR-USD")
    }

    fn minute() -> Period {
        "1m".parse().unwrap()
    }

    #[test]
    fn seed_window_ends_at_now() {
        let (mut c, _feed, _rx) = coordinator();

        let request = c.begin_switch(usd_jpy(), minute()).unwrap();

        assert_eq!(request.generation, 1);
        assert_eq!(request.to, 600_000);
        assert_eq!(request.from, 600_000 - 100 * 60_000);
        assert!(c.is_loading());
    }

    #[test]
    fn subscribes_only_after_seed() {
        let (mut c, feed, _rx) = coordinator();

        let request = c.begin_switch(usd_jpy(), minute()).unwrap();
        assert!(feed.calls.lock().unwrap().is_empty());

        assert!(c.finish_switch(&request, Vec::new()).is_none());
        assert_eq!(*feed.calls.lock().unwrap(), vec!["sub USD-JPY 1m 1"]);
        assert!(!c.is_loading());
    }

    #[test]
    fn switch_during_loading_is_deferred() {
        let (mut c, feed, _rx) = coordinator();

        let first = c.begin_switch(usd_jpy(), minute()).unwrap();
        assert!(c.begin_switch(eur_usd(), minute()).is_none());

        let second = c.finish_switch(&first, Vec::new()).unwrap();
        assert_eq!(second.symbol, eur_usd());
        assert_eq!(second.generation, 2);
        assert!(feed.calls.lock().unwrap().is_empty());

        c.finish_switch(&second, Vec::new());
        assert_eq!(*feed.calls.lock().unwrap(), vec!["sub EUR-USD 1m 2"]);
    }

    #[test]
    fn switch_and_ticks_publish_events_in_order() {
        let (mut c, _feed, mut rx) = coordinator();
        let request = c.begin_switch(usd_jpy(), minute()).unwrap();
        c.finish_switch(&request, Vec::new());

        let tick = |t, price| LiveTick {
            generation: 1,
            tick: Tick::new(t, price, dec!(1)),
        };
        c.handle_tick(tick(600_500, dec!(150)));
        c.handle_tick(tick(601_000, dec!(151)));

        assert_eq!(rx.try_recv().unwrap(), ChartEvent::Loading { loading: true });
        assert!(matches!(rx.try_recv().unwrap(), ChartEvent::Reset { candles, .. } if candles.is_empty()));
        assert_eq!(rx.try_recv().unwrap(), ChartEvent::Loading { loading: false });
        assert!(matches!(rx.try_recv().unwrap(), ChartEvent::Append { candle } if candle.open == dec!(150)));
        assert!(matches!(rx.try_recv().unwrap(), ChartEvent::Update { candle } if candle.close == dec!(151)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_event_receiver_does_not_stop_merging() {
        let (mut c, _feed, rx) = coordinator();
        drop(rx);

        let request = c.begin_switch(usd_jpy(), minute()).unwrap();
        c.finish_switch(&request, Vec::new());
        let outcome = c.handle_tick(LiveTick {
            generation: 1,
            tick: Tick::new(600_500, dec!(150), dec!(1)),
        });

        assert!(matches!(outcome, Some(MergeOutcome::Append(_))));
        assert_eq!(c.open_candle().unwrap().open, dec!(150));
    }

    #[tokio::test]
    async fn closed_feed_stops_delivering_ticks() {
        let (mut c, _feed, _rx) = coordinator();
        let request = c.begin_switch(usd_jpy(), minute()).unwrap();
        c.finish_switch(&request, Vec::new());
        assert_eq!(c.ticks.as_ref().map(TickStream::generation), Some(1));

        // The recording feed drops its sender, so the stream is already closed.
        let waited = tokio::time::timeout(std::time::Duration::from_millis(50), c.next_tick()).await;

        assert!(waited.is_err());
        assert!(c.ticks.is_none());
    }

    #[test]
    fn tick_with_old_generation_is_ignored() {
        let (mut c, _feed, _rx) = coordinator();
        let request = c.begin_switch(usd_jpy(), minute()).unwrap();
        c.finish_switch(&request, Vec::new());

        let stale = LiveTick {
            generation: 0,
            tick: Tick::new(600_000, dec!(1), dec!(1)),
        };
        assert!(c.handle_tick(stale).is_none());
        assert!(c.open_candle().is_none());
    }

    #[test]
    fn load_more_rejected_while_loading() {
        let (mut c, _feed, _rx) = coordinator();
        assert_eq!(c.begin_load_more(600_000), LoadMore::Rejected);

        c.begin_switch(usd_jpy(), minute()).unwrap();
        assert_eq!(c.begin_load_more(600_000), LoadMore::Rejected);
    }

    #[test]
    fn dispose_unsubscribes_and_invalidates_results() {
        let (mut c, feed, _rx) = coordinator();
        let request = c.begin_switch(usd_jpy(), minute()).unwrap();
        c.finish_switch(&request, Vec::new());

        c.dispose();

        assert!(c.state().is_none());
        assert_eq!(feed.calls.lock().unwrap().last().unwrap(), "unsub USD-JPY 1m");
        assert!(c.finish_switch(&request, Vec::new()).is_none());
    }
}
