//! Live tick merging into the currently open candle.
//!
//! [`LiveMerger`] is a two-state machine over the open candle:
//!
//! | State | Tick maps to                 | Action                        | Next  |
//! |-------|------------------------------|-------------------------------|-------|
//! | Empty | any window                   | open candle at tick price     | Open  |
//! | Open  | the open window              | update high/low/close/volume  | Open  |
//! | Open  | a later window               | open candle at previous close | Open  |
//! | Open  | an earlier window            | drop tick                     | Open  |
//!
//! A dropped tick never reopens a closed candle. Ticks more than one window
//! behind are counted as data-quality warnings.

use tracing::{debug, warn};

use crate::boundary::{previous_window_start, window_start};
use crate::models::{Candle, Period, Tick};

/// Whether a candle is currently being accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergerState {
    Empty,
    Open,
}

/// Why a tick was not merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The tick belongs to the window right before the open one.
    LateTick,
    /// The tick is more than one window behind the open candle.
    OutOfOrder,
}

/// Result of feeding one tick to the merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new candle was opened.
    Append(Candle),
    /// The open candle was updated in place.
    Update(Candle),
    /// The tick was discarded.
    Dropped(DropReason),
}

/// Holds the open candle of one subscription and folds ticks into it.
#[derive(Debug, Clone)]
pub struct LiveMerger {
    period: Period,
    open: Option<Candle>,
    data_quality_warnings: u64,
}

impl LiveMerger {
    #[must_use]
    pub fn new(period: Period) -> Self {
        Self {
            period,
            open: None,
            data_quality_warnings: 0,
        }
    }

    pub fn period(&self) -> &Period {
        &self.period
    }

    pub fn state(&self) -> MergerState {
        if self.open.is_some() {
            MergerState::Open
        } else {
            MergerState::Empty
        }
    }

    pub fn open_candle(&self) -> Option<&Candle> {
        self.open.as_ref()
    }

    /// Window start of the open candle.
    pub fn last_boundary(&self) -> Option<i64> {
        self.open.map(|c| c.timestamp)
    }

    /// Number of ticks dropped for arriving more than one window late.
    pub fn data_quality_warnings(&self) -> u64 {
        self.data_quality_warnings
    }

    /// Returns to the empty state.
    pub fn reset(&mut self) {
        self.open = None;
    }

    /// Resets, then adopts `candle` (typically the last history candle) as
    /// the open candle.
    pub fn seed(&mut self, candle: Option<Candle>) {
        self.reset();
        self.open = candle;
    }

    /// Folds one tick into the open candle, opening a new one when the tick
    /// crosses into a later window.
    ///
    /// A new candle opens at the previous candle's close (or the tick price
    /// when there is none), then absorbs the tick, so `open` never jumps
    /// away from the prior close. Within a window `open` never changes.
    pub fn merge(&mut self, tick: &Tick) -> MergeOutcome {
        let boundary = window_start(&self.period, tick.timestamp);

        if let Some(open) = self.open.as_mut() {
            if boundary == open.timestamp {
                open.high = open.high.max(tick.price);
                open.low = open.low.min(tick.price);
                open.close = tick.price;
                open.volume += tick.volume;
                return MergeOutcome::Update(*open);
            }

            if boundary < open.timestamp {
                let open_boundary = open.timestamp;
                return self.reject(tick, boundary, open_boundary);
            }
        }

        let open_price = self.open.map_or(tick.price, |previous| previous.close);
        let candle = Candle {
            timestamp: boundary,
            open: open_price,
            high: open_price.max(tick.price),
            low: open_price.min(tick.price),
            close: tick.price,
            volume: tick.volume,
        };
        self.open = Some(candle);

        MergeOutcome::Append(candle)
    }

    fn reject(&mut self, tick: &Tick, boundary: i64, open_boundary: i64) -> MergeOutcome {
        if previous_window_start(&self.period, open_boundary) == boundary {
            debug!(
                period = %self.period,
                tick_time = tick.timestamp,
                open_boundary,
                "Dropping tick for closed candle"
            );
            return MergeOutcome::Dropped(DropReason::LateTick);
        }

        self.data_quality_warnings += 1;
        warn!(
            period = %self.period,
            tick_time = tick.timestamp,
            boundary,
            open_boundary,
            warnings = self.data_quality_warnings,
            "Dropping out-of-order tick"
        );
        MergeOutcome::Dropped(DropReason::OutOfOrder)
    }
}
