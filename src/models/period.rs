//! Candle period (multiplier × timespan) definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KlineError;

pub const SECOND_MS: i64 = 1_000;
pub const MINUTE_MS: i64 = 60 * SECOND_MS;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;
pub const WEEK_MS: i64 = 7 * DAY_MS;

/// Time unit a [`Period`] is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timespan {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Timespan {
    /// Returns the wire name used by the history API (`unit` parameter).
    pub fn as_str(&self) -> &'static str {
        match self {
            Timespan::Second => "second",
            Timespan::Minute => "minute",
            Timespan::Hour => "hour",
            Timespan::Day => "day",
            Timespan::Week => "week",
            Timespan::Month => "month",
            Timespan::Year => "year",
        }
    }

    /// Length of one unit in milliseconds, or `None` for calendar units
    /// (month, year) whose length varies.
    pub fn unit_ms(&self) -> Option<i64> {
        match self {
            Timespan::Second => Some(SECOND_MS),
            Timespan::Minute => Some(MINUTE_MS),
            Timespan::Hour => Some(HOUR_MS),
            Timespan::Day => Some(DAY_MS),
            Timespan::Week => Some(WEEK_MS),
            Timespan::Month | Timespan::Year => None,
        }
    }

    /// Whether window starts follow the calendar (Monday, first of month,
    /// first of year) rather than plain epoch multiples.
    pub fn is_calendar(&self) -> bool {
        matches!(self, Timespan::Week | Timespan::Month | Timespan::Year)
    }

    /// The granularity the upstream history source serves for this
    /// timespan, as `(timespan, multiplier)`.
    ///
    /// Seconds come as 5-second bars; minute, hour and day bars are served
    /// natively; week, month and year are built from daily bars.
    pub fn native_granularity(&self) -> (Timespan, u32) {
        match self {
            Timespan::Second => (Timespan::Second, 5),
            Timespan::Minute => (Timespan::Minute, 1),
            Timespan::Hour => (Timespan::Hour, 1),
            Timespan::Day | Timespan::Week | Timespan::Month | Timespan::Year => {
                (Timespan::Day, 1)
            }
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Timespan::Second => "s",
            Timespan::Minute => "m",
            Timespan::Hour => "h",
            Timespan::Day => "D",
            Timespan::Week => "W",
            Timespan::Month => "M",
            Timespan::Year => "Y",
        }
    }
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candle width: `multiplier × timespan`, plus the label shown to users.
///
/// Immutable once built; construction rejects a zero multiplier so every
/// period has a positive window width.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PeriodDef")]
pub struct Period {
    multiplier: u32,
    timespan: Timespan,
    label: String,
}

/// Unvalidated serde shape of a [`Period`]. Accepts `text` as an alias
/// for `label`.
#[derive(Deserialize)]
struct PeriodDef {
    multiplier: u32,
    timespan: Timespan,
    #[serde(alias = "text")]
    label: String,
}

impl TryFrom<PeriodDef> for Period {
    type Error = KlineError;

    fn try_from(def: PeriodDef) -> Result<Self, Self::Error> {
        Period::new(def.multiplier, def.timespan, def.label)
    }
}

impl Period {
    /// Builds a period.
    ///
    /// # Errors
    ///
    /// Returns [`KlineError::InvalidPeriod`] if `multiplier` is zero.
    pub fn new(multiplier: u32, timespan: Timespan, label: impl Into<String>) -> crate::Result<Self> {
        if multiplier == 0 {
            return Err(KlineError::InvalidPeriod(
                "multiplier must be positive".to_string(),
            ));
        }

        Ok(Self {
            multiplier,
            timespan,
            label: label.into(),
        })
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn timespan(&self) -> Timespan {
        self.timespan
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Window width in milliseconds for fixed-width periods (second through
    /// week). `None` for month and year.
    pub fn width_ms(&self) -> Option<i64> {
        self.timespan
            .unit_ms()
            .map(|unit| unit * i64::from(self.multiplier))
    }

    /// Whether the upstream source already serves bars at this exact width,
    /// so history can be passed through without aggregation.
    pub fn is_native(&self) -> bool {
        self.timespan.native_granularity() == (self.timespan, self.multiplier)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl FromStr for Period {
    type Err = KlineError;

    /// Parses labels such as `5s`, `1m`, `4h`, `1D`, `1W`, `1M` and `1Y`.
    ///
    /// Lower-case `m` is minutes and upper-case `M` is months; the other
    /// units accept either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| KlineError::InvalidPeriod(format!("missing unit in {s:?}")))?;
        let (digits, unit) = s.split_at(split);

        let multiplier: u32 = digits
            .parse()
            .map_err(|_| KlineError::InvalidPeriod(format!("bad multiplier in {s:?}")))?;

        let timespan = match unit {
            "s" | "S" => Timespan::Second,
            "m" => Timespan::Minute,
            "h" | "H" => Timespan::Hour,
            "d" | "D" => Timespan::Day,
            "w" | "W" => Timespan::Week,
            "M" => Timespan::Month,
            "y" | "Y" => Timespan::Year,
            other => {
                return Err(KlineError::InvalidPeriod(format!(
                    "unknown unit {other:?} in {s:?}"
                )));
            }
        };

        Period::new(multiplier, timespan, format!("{multiplier}{}", timespan.suffix()))
    }
}
