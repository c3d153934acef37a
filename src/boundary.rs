//! Period window boundary arithmetic.
//!
//! Maps a timestamp to the start of the candle window that contains it,
//! steps between adjacent windows, and computes the `[from, to]` request
//! range covering a number of trailing windows. Every function here is pure
//! and deterministic; other components rely on identical inputs producing
//! identical boundaries because window starts double as candle identities.
//!
//! Second, minute, hour and day periods sit on a fixed grid of
//! `multiplier × unit` milliseconds counted from the Unix epoch. Week,
//! month and year periods follow the UTC calendar: weeks start on Monday
//! 00:00, months on the first day, years on January 1st. Multi-unit
//! calendar windows group consecutive units on a fixed grid (two-week
//! windows counted from the first Monday after the epoch, three-month
//! windows as quarters, and so on).

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};

use crate::models::period::{DAY_MS, HOUR_MS, MINUTE_MS, SECOND_MS, WEEK_MS};
use crate::models::{Period, Timespan};

/// Monday 1970-01-05 00:00 UTC, the origin of the week grid.
const EPOCH_MONDAY_MS: i64 = 4 * DAY_MS;

/// Flat month length used when sizing month request ranges.
const FLAT_MONTH_MS: i64 = 30 * DAY_MS;

/// Flat year length used when sizing year request ranges.
const FLAT_YEAR_MS: i64 = 365 * DAY_MS;

/// How windows of a period are laid out on the time axis.
#[derive(Debug, Clone, Copy)]
enum Grid {
    Fixed(i64),
    Week(u32),
    Month(u32),
    Year(u32),
}

fn grid(period: &Period) -> Grid {
    let m = period.multiplier();
    match period.timespan() {
        Timespan::Second => Grid::Fixed(SECOND_MS * i64::from(m)),
        Timespan::Minute => Grid::Fixed(MINUTE_MS * i64::from(m)),
        Timespan::Hour => Grid::Fixed(HOUR_MS * i64::from(m)),
        Timespan::Day => Grid::Fixed(DAY_MS * i64::from(m)),
        Timespan::Week => Grid::Week(m),
        Timespan::Month => Grid::Month(m),
        Timespan::Year => Grid::Year(m),
    }
}

/// Returns the start of the window of `period` containing `timestamp`.
pub fn window_start(period: &Period, timestamp: i64) -> i64 {
    match grid(period) {
        Grid::Fixed(width) => timestamp.saturating_sub(timestamp.rem_euclid(width)),
        Grid::Week(weeks) => week_start(timestamp, weeks),
        Grid::Month(months) => month_start(timestamp, months),
        Grid::Year(years) => year_start(timestamp, years),
    }
}

/// Returns the start of the window following the one that begins at `start`.
pub fn next_window_start(period: &Period, start: i64) -> i64 {
    match grid(period) {
        Grid::Fixed(width) => start + width,
        Grid::Week(weeks) => start + i64::from(weeks) * WEEK_MS,
        Grid::Month(months) => shift_months(start, i64::from(months)),
        Grid::Year(years) => shift_months(start, 12 * i64::from(years)),
    }
}

/// Returns the start of the window preceding the one that begins at `start`.
pub fn previous_window_start(period: &Period, start: i64) -> i64 {
    match grid(period) {
        Grid::Fixed(width) => start - width,
        Grid::Week(weeks) => start - i64::from(weeks) * WEEK_MS,
        Grid::Month(months) => shift_months(start, -i64::from(months)),
        Grid::Year(years) => shift_months(start, -12 * i64::from(years)),
    }
}

/// Computes the `[from, to]` range covering `count` windows that end at the
/// window containing `to_timestamp`.
///
/// `to` is always the aligned window start. For fixed-width periods `from`
/// is exactly `count` windows before it. Week, month and year ranges size
/// `from` with a flat duration (7, 30 or 365 days per unit) measured from the
/// unaligned `to_timestamp`; month and year then snap `from` to the first of
/// its month or year. Week `from` is left unaligned.
pub fn range(period: &Period, to_timestamp: i64, count: u32) -> (i64, i64) {
    let count = i64::from(count);
    match grid(period) {
        Grid::Fixed(width) => {
            let to = window_start(period, to_timestamp);
            (to.saturating_sub(count.saturating_mul(width)), to)
        }
        Grid::Week(weeks) => {
            let span = count.saturating_mul(i64::from(weeks)).saturating_mul(WEEK_MS);
            (
                to_timestamp.saturating_sub(span),
                week_start(to_timestamp, weeks),
            )
        }
        Grid::Month(months) => {
            let span = count
                .saturating_mul(i64::from(months))
                .saturating_mul(FLAT_MONTH_MS);
            (
                month_start(to_timestamp.saturating_sub(span), months),
                month_start(to_timestamp, months),
            )
        }
        Grid::Year(years) => {
            let span = count
                .saturating_mul(i64::from(years))
                .saturating_mul(FLAT_YEAR_MS);
            (
                year_start(to_timestamp.saturating_sub(span), years),
                year_start(to_timestamp, years),
            )
        }
    }
}

/// Calendar date of `timestamp`, saturating to chrono's supported range.
fn utc_date(timestamp: i64) -> NaiveDate {
    match DateTime::<Utc>::from_timestamp_millis(timestamp) {
        Some(dt) => dt.date_naive(),
        None if timestamp < 0 => NaiveDate::MIN,
        None => NaiveDate::MAX,
    }
}

fn midnight(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Calendar window start for `timestamp`, never later than `timestamp`
/// itself (dates below chrono's range saturate upward).
fn calendar_start(timestamp: i64, date: Option<NaiveDate>) -> i64 {
    date.map_or(timestamp, |d| midnight(d).min(timestamp))
}

/// Start of the `weeks`-week window containing `timestamp`. Windows are
/// counted from Monday 1970-01-05, so a one-week window runs Monday to
/// Sunday.
fn week_start(timestamp: i64, weeks: u32) -> i64 {
    let width = i64::from(weeks) * WEEK_MS;
    let offset = timestamp.saturating_sub(EPOCH_MONDAY_MS).rem_euclid(width);
    timestamp.saturating_sub(offset)
}

/// First day of the `months`-month window containing `timestamp`. Windows
/// are counted from January of year 0, so three-month windows are calendar
/// quarters.
fn month_start(timestamp: i64, months: u32) -> i64 {
    let date = utc_date(timestamp);
    let index = i64::from(date.year()) * 12 + i64::from(date.month0());
    let floored = index - index.rem_euclid(i64::from(months));
    let start = i32::try_from(floored.div_euclid(12))
        .ok()
        .and_then(|year| {
            let month = u32::try_from(floored.rem_euclid(12)).ok()? + 1;
            NaiveDate::from_ymd_opt(year, month, 1)
        });
    calendar_start(timestamp, start)
}

/// January 1st of the `years`-year window containing `timestamp`.
fn year_start(timestamp: i64, years: u32) -> i64 {
    let year = utc_date(timestamp).year();
    let years = i32::try_from(years).unwrap_or(i32::MAX);
    let start = NaiveDate::from_ymd_opt(year - year.rem_euclid(years), 1, 1);
    calendar_start(timestamp, start)
}

fn shift_months(start: i64, months: i64) -> i64 {
    let date = utc_date(start);
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).unwrap_or(u32::MAX));
    let shifted = if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    };
    shifted.map(midnight).unwrap_or(start)
}
