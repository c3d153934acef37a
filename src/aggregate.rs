//! Bucketing of fine-grained history bars into coarser candles.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::boundary::window_start;
use crate::models::{Candle, Period, RawBar};

/// Groups `bars` into windows of `period` and emits one candle per
/// non-empty window, in ascending window order.
///
/// Fixed-width periods bucket relative to `window_origin`:
/// `origin + floor((t - origin) / width) × width`. Week, month and year
/// periods bucket by their calendar window start, multiplier included, so
/// the output stays calendar-aligned; `window_origin` is unused for them.
///
/// Within a bucket, bars are ordered by timestamp before `open` and `close`
/// are taken, since upstream order is not guaranteed. Windows without bars
/// are skipped rather than filled.
pub fn aggregate(bars: &[RawBar], period: &Period, window_origin: i64) -> Vec<Candle> {
    let mut buckets: BTreeMap<i64, Vec<&RawBar>> = BTreeMap::new();

    for bar in bars {
        buckets
            .entry(bucket_key(period, window_origin, bar.timestamp))
            .or_default()
            .push(bar);
    }

    buckets
        .into_iter()
        .filter_map(|(key, mut items)| {
            items.sort_by_key(|bar| bar.timestamp);
            fold_bucket(key, &items)
        })
        .collect()
}

fn bucket_key(period: &Period, origin: i64, timestamp: i64) -> i64 {
    match period.width_ms() {
        Some(width) if !period.timespan().is_calendar() => {
            origin + (timestamp - origin).div_euclid(width) * width
        }
        _ => window_start(period, timestamp),
    }
}

fn fold_bucket(key: i64, items: &[&RawBar]) -> Option<Candle> {
    let first = items.first()?;
    let last = items.last()?;

    let mut high = first.high;
    let mut low = first.low;
    let mut volume = Decimal::ZERO;
    for bar in items {
        high = high.max(bar.high);
        low = low.min(bar.low);
        volume += bar.volume;
    }

    Some(Candle {
        timestamp: key,
        open: first.open,
        high,
        low,
        close: last.close,
        volume,
    })
}
