//! Historical candle fetching and normalization.

use std::sync::Arc;

use tracing::{debug, error};

use crate::aggregate::aggregate;
use crate::datafeed::HistorySource;
use crate::models::{Candle, Period, SymbolInfo};

/// Wraps a [`HistorySource`] and turns its native-granularity bars into
/// candles of the requested period.
///
/// Cheap to clone; clones share the underlying source.
#[derive(Clone)]
pub struct HistoryFetcher {
    source: Arc<dyn HistorySource>,
}

impl HistoryFetcher {
    pub fn new(source: Arc<dyn HistorySource>) -> Self {
        Self { source }
    }

    /// Fetches candles of `period` for `symbol` covering `[from, to]`.
    ///
    /// Bars already at the requested width are passed through; finer bars
    /// are aggregated with `from` as the bucket origin. The result is
    /// ascending by timestamp with no duplicate timestamps.
    ///
    /// Transport failures are logged and yield an empty sequence, which
    /// callers treat as "no data for this range".
    pub async fn fetch(&self, symbol: &SymbolInfo, period: &Period, from: i64, to: i64) -> Vec<Candle> {
        let (native_timespan, _) = period.timespan().native_granularity();

        let bars = match self.source.history(symbol, native_timespan, from, to).await {
            Ok(bars) => bars,
            Err(e) => {
                error!(
                    symbol = symbol.api_symbol(),
                    period = %period,
                    from,
                    to,
                    "Error fetching historical data: {e}"
                );
                return Vec::new();
            }
        };

        let mut candles = if period.is_native() {
            bars.into_iter().map(Candle::from).collect()
        } else {
            aggregate(&bars, period, from)
        };

        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);

        debug!(
            symbol = symbol.api_symbol(),
            period = %period,
            from,
            to,
            candles = candles.len(),
            "Loaded candles"
        );

        candles
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::error::KlineError;
    use crate::models::{RawBar, Timespan};

    /// Serves a fixed set of bars and records each request.
    struct FixedSource {
        bars: Vec<RawBar>,
        fail: bool,
        requests: Mutex<Vec<(Timespan, i64, i64)>>,
    }

    #[async_trait]
    impl HistorySource for FixedSource {
        async fn history(
            &self,
            _symbol: &SymbolInfo,
            timespan: Timespan,
            from: i64,
            to: i64,
        ) -> crate::Result<Vec<RawBar>> {
            self.requests.lock().unwrap().push((timespan, from, to));
            if self.fail {
                return Err(KlineError::WebSocket(tungstenite::Error::ConnectionClosed));
            }
            Ok(self.bars.clone())
        }
    }

    fn source(bars: Vec<RawBar>, fail: bool) -> Arc<FixedSource> {
        Arc::new(FixedSource {
            bars,
            fail,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn bar(t: i64, price: rust_decimal::Decimal) -> RawBar {
        RawBar {
            timestamp: t,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: dec!(1),
        }
    }

    fn symbol() -> SymbolInfo {
        SymbolInfo::new("C:USD-JPY", "USD-JPY")
    }

    #[tokio::test]
    async fn native_period_passes_bars_through_sorted_and_deduplicated() {
        let src = source(
            vec![bar(120_000, dec!(3)), bar(60_000, dec!(2)), bar(60_000, dec!(2))],
            false,
        );
        let fetcher = HistoryFetcher::new(src.clone());
        let period: Period = "1m".parse().unwrap();

        let candles = fetcher.fetch(&symbol(), &period, 0, 180_000).await;

        let keys: Vec<i64> = candles.iter().map(|c| c.timestamp).collect();
        assert_eq!(keys, vec![60_000, 120_000]);
        assert_eq!(src.requests.lock().unwrap()[0], (Timespan::Minute, 0, 180_000));
    }

    #[tokio::test]
    async fn coarser_period_aggregates_from_origin() {
        let src = source(
            (0..6).map(|i| bar(i * 60_000, rust_decimal::Decimal::from(i))).collect(),
            false,
        );
        let fetcher = HistoryFetcher::new(src);
        let period: Period = "3m".parse().unwrap();

        let candles = fetcher.fetch(&symbol(), &period, 0, 360_000).await;

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 0);
        assert_eq!(candles[0].open, dec!(0));
        assert_eq!(candles[0].close, dec!(2));
        assert_eq!(candles[0].volume, dec!(3));
        assert_eq!(candles[1].timestamp, 180_000);
        assert_eq!(candles[1].high, dec!(5));
    }

    #[tokio::test]
    async fn second_periods_request_native_five_second_bars() {
        let src = source(Vec::new(), false);
        let fetcher = HistoryFetcher::new(src.clone());
        let period: Period = "15s".parse().unwrap();

        fetcher.fetch(&symbol(), &period, 0, 15_000).await;

        assert_eq!(src.requests.lock().unwrap()[0].0, Timespan::Second);
    }

    #[tokio::test]
    async fn week_period_aggregates_daily_bars_into_monday_windows() {
        // Sunday 2024-01-07, Monday 2024-01-08 and Tuesday 2024-01-09.
        let jan_7 = 1_704_585_600_000;
        let jan_8 = 1_704_672_000_000;
        let jan_9 = 1_704_758_400_000;
        let src = source(
            vec![bar(jan_9, dec!(3)), bar(jan_7, dec!(1)), bar(jan_8, dec!(2))],
            false,
        );
        let fetcher = HistoryFetcher::new(src.clone());
        let period: Period = "1W".parse().unwrap();
        let from = jan_7 - 12 * 3_600_000;

        let candles = fetcher.fetch(&symbol(), &period, from, jan_9).await;

        assert_eq!(src.requests.lock().unwrap()[0], (Timespan::Day, from, jan_9));
        let keys: Vec<i64> = candles.iter().map(|c| c.timestamp).collect();
        assert_eq!(keys, vec![1_704_067_200_000, jan_8]);
        assert_eq!(candles[1].open, dec!(2));
        assert_eq!(candles[1].close, dec!(3));
        assert_eq!(candles[1].volume, dec!(2));
    }

    #[tokio::test]
    async fn transport_failure_yields_empty() {
        let fetcher = HistoryFetcher::new(source(vec![bar(0, dec!(1))], true));
        let period: Period = "1m".parse().unwrap();

        assert!(fetcher.fetch(&symbol(), &period, 0, 60_000).await.is_empty());
    }
}
