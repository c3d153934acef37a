//! Backward pagination through history.
//!
//! Each page ends one window before the oldest candle the consumer holds and
//! spans `page_size` windows further back. The paginator remembers the
//! oldest timestamp it has handed out, so repeated requests against the same
//! oldest timestamp keep walking backward instead of returning the same page.

use tracing::{debug, info};

use crate::boundary::{previous_window_start, range, window_start};
use crate::history::HistoryFetcher;
use crate::models::{Candle, Period, SymbolInfo};

/// The range one backfill page requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Exclusive upper bound for returned candle timestamps.
    pub oldest: i64,
    pub from: i64,
    pub to: i64,
}

/// A page of older candles, ascending, all strictly older than the
/// requested oldest timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub candles: Vec<Candle>,
    /// No more history is available; stop requesting pages.
    pub exhausted: bool,
}

/// What a call to [`BackfillPaginator::begin`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillStep {
    /// Fetch this window, then call [`BackfillPaginator::complete`].
    Fetch(PageWindow),
    /// History already ran out.
    Exhausted,
    /// Another page is still loading; the request is ignored.
    Busy,
}

/// Pages backward through the history of one `(symbol, period)`.
#[derive(Debug, Clone)]
pub struct BackfillPaginator {
    symbol: SymbolInfo,
    period: Period,
    page_size: u32,
    in_flight: bool,
    exhausted: bool,
    floor: Option<i64>,
}

impl BackfillPaginator {
    #[must_use]
    pub fn new(symbol: SymbolInfo, period: Period, page_size: u32) -> Self {
        Self {
            symbol,
            period,
            page_size,
            in_flight: false,
            exhausted: false,
            floor: None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn symbol(&self) -> &SymbolInfo {
        &self.symbol
    }

    pub fn period(&self) -> &Period {
        &self.period
    }

    /// Starts a page load for a consumer whose oldest candle is at
    /// `oldest_loaded`, marking the paginator busy until
    /// [`complete`](Self::complete).
    pub fn begin(&mut self, oldest_loaded: i64) -> BackfillStep {
        if self.in_flight {
            debug!(period = %self.period, oldest_loaded, "Backfill already in flight");
            return BackfillStep::Busy;
        }
        if self.exhausted {
            return BackfillStep::Exhausted;
        }

        let oldest = self.floor.map_or(oldest_loaded, |floor| floor.min(oldest_loaded));
        let to = previous_window_start(&self.period, window_start(&self.period, oldest));
        let (from, _) = range(&self.period, to, self.page_size);

        self.in_flight = true;
        BackfillStep::Fetch(PageWindow { oldest, from, to })
    }

    /// Finishes the page started by [`begin`](Self::begin).
    ///
    /// Drops anything not strictly older than the window's `oldest`, and
    /// marks the paginator exhausted when nothing remains.
    pub fn complete(&mut self, window: &PageWindow, candles: Vec<Candle>) -> Page {
        self.in_flight = false;

        let candles: Vec<Candle> = candles
            .into_iter()
            .filter(|c| c.timestamp < window.oldest)
            .collect();

        if candles.is_empty() {
            self.exhausted = true;
            info!(
                symbol = self.symbol.api_symbol(),
                period = %self.period,
                oldest = window.oldest,
                "History exhausted"
            );
            return Page {
                candles,
                exhausted: true,
            };
        }

        self.floor = candles.first().map(|c| c.timestamp);
        debug!(
            symbol = self.symbol.api_symbol(),
            period = %self.period,
            from = window.from,
            to = window.to,
            candles = candles.len(),
            "Loaded backfill page"
        );

        Page {
            candles,
            exhausted: false,
        }
    }

    /// Loads the page preceding `oldest_loaded` through `history`.
    ///
    /// Returns `None` when a page is already loading.
    pub async fn load_more(&mut self, history: &HistoryFetcher, oldest_loaded: i64) -> Option<Page> {
        match self.begin(oldest_loaded) {
            BackfillStep::Busy => None,
            BackfillStep::Exhausted => Some(Page {
                candles: Vec::new(),
                exhausted: true,
            }),
            BackfillStep::Fetch(window) => {
                let candles = history
                    .fetch(&self.symbol, &self.period, window.from, window.to)
                    .await;
                Some(self.complete(&window, candles))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn paginator(page_size: u32) -> BackfillPaginator {
        BackfillPaginator::new(
            SymbolInfo::new("C:USD-JPY", "USD-JPY"),
            "1m".parse().unwrap(),
            page_size,
        )
    }

    fn flat(t: i64) -> Candle {
        Candle::flat(t, dec!(1), dec!(1))
    }

    fn fetch_window(step: BackfillStep) -> PageWindow {
        match step {
            BackfillStep::Fetch(window) => window,
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    #[test]
    fn window_ends_one_window_before_oldest() {
        let mut p = paginator(60);

        let window = fetch_window(p.begin(600_500));

        assert_eq!(window.to, 540_000);
        assert_eq!(window.from, 540_000 - 60 * 60_000);
        assert_eq!(window.oldest, 600_500);
    }

    #[test]
    fn second_request_while_in_flight_is_ignored() {
        let mut p = paginator(10);
        let window = fetch_window(p.begin(600_000));

        assert_eq!(p.begin(600_000), BackfillStep::Busy);

        p.complete(&window, vec![flat(540_000)]);
        assert!(!p.is_in_flight());
        assert!(matches!(p.begin(600_000), BackfillStep::Fetch(_)));
    }

    #[test]
    fn drops_candles_at_or_after_oldest() {
        let mut p = paginator(10);
        let window = fetch_window(p.begin(600_000));

        let page = p.complete(&window, vec![flat(480_000), flat(540_000), flat(600_000), flat(660_000)]);

        assert_eq!(
            page.candles.iter().map(|c| c.timestamp).collect::<Vec<_>>(),
            vec![480_000, 540_000]
        );
        assert!(!page.exhausted);
    }

    #[test]
    fn repeated_requests_walk_backward() {
        let mut p = paginator(2);

        let first = fetch_window(p.begin(600_000));
        p.complete(&first, vec![flat(420_000), flat(480_000), flat(540_000)]);

        let second = fetch_window(p.begin(600_000));
        assert_eq!(second.oldest, 420_000);
        assert_eq!(second.to, 360_000);
    }

    #[test]
    fn empty_page_marks_exhaustion() {
        let mut p = paginator(10);
        let window = fetch_window(p.begin(600_000));

        let page = p.complete(&window, Vec::new());

        assert!(page.exhausted);
        assert!(p.is_exhausted());
        assert_eq!(p.begin(600_000), BackfillStep::Exhausted);
    }
}
