//! Bucket key computation
//!
//! A bucket key is a plain function of the (adjusted) timestamp. The two
//! policies share one code path in the collector; only the value of
//! [`BucketKeyFn`] differs.
//!
//! Interval keys use floor alignment, so the window for a pre-epoch timestamp
//! starts below it:
//!
//! ```text
//! interval = 10
//!   t = 25  → 20   window [20, 30)
//!   t = -5  → -10  window [-10, 0)
//!   t = -10 → -10
//! ```

use crate::index::Timestamp;
use chrono::FixedOffset;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

const SECOND_MS: i64 = 1000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const WEEK_MS: i64 = 7 * DAY_MS;

/// Maps a timestamp to the key of the bucket containing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKeyFn {
    /// Every distinct timestamp is its own bucket
    Identity,
    /// Fixed-width windows of the given width in milliseconds (> 1)
    Interval(i64),
}

impl BucketKeyFn {
    /// Select the policy for an interval in milliseconds.
    ///
    /// Returns `None` for non-positive intervals; `1` selects
    /// [`BucketKeyFn::Identity`].
    pub fn new(interval: i64) -> Option<Self> {
        match interval {
            i if i <= 0 => None,
            1 => Some(BucketKeyFn::Identity),
            i => Some(BucketKeyFn::Interval(i)),
        }
    }

    /// Bucket key for `timestamp`
    ///
    /// Saturates at `i64::MIN` for timestamps whose window would start below
    /// the representable range.
    #[inline]
    pub fn key(&self, timestamp: Timestamp) -> i64 {
        match *self {
            BucketKeyFn::Identity => timestamp,
            BucketKeyFn::Interval(interval) => {
                timestamp.saturating_sub(timestamp.rem_euclid(interval))
            }
        }
    }

    /// Window width in milliseconds
    pub fn interval(&self) -> i64 {
        match *self {
            BucketKeyFn::Identity => 1,
            BucketKeyFn::Interval(interval) => interval,
        }
    }
}

impl fmt::Display for BucketKeyFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKeyFn::Identity => write!(f, "identity"),
            BucketKeyFn::Interval(interval) => write!(f, "interval({}ms)", interval),
        }
    }
}

/// Interval as written in configuration: raw milliseconds or an expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntervalSetting {
    Millis(i64),
    Expression(String),
}

impl IntervalSetting {
    /// Interval in milliseconds, `None` if the expression is not understood
    pub fn to_millis(&self) -> Option<i64> {
        match self {
            IntervalSetting::Millis(ms) => Some(*ms),
            IntervalSetting::Expression(expr) => parse_interval(expr),
        }
    }
}

impl fmt::Display for IntervalSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalSetting::Millis(ms) => write!(f, "{}", ms),
            IntervalSetting::Expression(expr) => write!(f, "{}", expr),
        }
    }
}

impl From<i64> for IntervalSetting {
    fn from(ms: i64) -> Self {
        IntervalSetting::Millis(ms)
    }
}

impl From<&str> for IntervalSetting {
    fn from(expr: &str) -> Self {
        IntervalSetting::Expression(expr.to_string())
    }
}

/// Parse an interval expression into milliseconds
///
/// Accepts unit names (`second`, `minute`, `hour`, `day`, `week`), plain
/// millisecond counts (`500`) and amounts with a unit suffix (`90m`, `1.5h`,
/// `7d`). Calendar units such as months have no fixed width and are
/// rejected.
pub fn parse_interval(expr: &str) -> Option<i64> {
    let expr = expr.trim().to_lowercase();

    let named = match expr.as_str() {
        "second" => Some(SECOND_MS),
        "minute" => Some(MINUTE_MS),
        "hour" => Some(HOUR_MS),
        "day" => Some(DAY_MS),
        "week" => Some(WEEK_MS),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    let re = Regex::new(r"^(\d+(?:\.\d+)?)\s*(ms|s|m|h|d|w)?$").ok()?;
    let caps = re.captures(&expr)?;
    let amount: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = match caps.get(2).map(|m| m.as_str()) {
        None | Some("ms") => 1,
        Some("s") => SECOND_MS,
        Some("m") => MINUTE_MS,
        Some("h") => HOUR_MS,
        Some("d") => DAY_MS,
        Some("w") => WEEK_MS,
        Some(_) => return None,
    };

    let millis = amount * unit as f64;
    if millis.fract() != 0.0 || millis < 1.0 || millis > i64::MAX as f64 {
        return None;
    }
    Some(millis as i64)
}

/// Fixed UTC offset that moves bucket boundaries
///
/// With an offset of `+02:00`, day buckets start at local midnight of that
/// offset rather than at UTC midnight. Keys stay UTC epoch milliseconds: the
/// local midnight `00:00+02:00` is keyed `22:00Z` of the previous day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeAdjustment {
    offset_ms: i64,
}

impl TimeAdjustment {
    /// No adjustment
    pub const UTC: TimeAdjustment = TimeAdjustment { offset_ms: 0 };

    pub fn from_offset(offset: FixedOffset) -> Self {
        Self {
            offset_ms: offset.local_minus_utc() as i64 * SECOND_MS,
        }
    }

    /// Parse `UTC`, `Z`, `+02:00`, `-0530` or a whole number of hours (`-5`)
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("utc") || input.eq_ignore_ascii_case("z") || input.is_empty() {
            return Some(Self::UTC);
        }

        let (sign, rest) = match input.as_bytes()[0] {
            b'+' => (1, &input[1..]),
            b'-' => (-1, &input[1..]),
            _ => (1, input),
        };

        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let (hours, minutes) = match digits.len() {
            1 | 2 => (digits.parse::<i32>().ok()?, 0),
            4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
            _ => return None,
        };
        if minutes >= 60 {
            return None;
        }

        let seconds = sign * (hours * 3600 + minutes * 60);
        FixedOffset::east_opt(seconds).map(Self::from_offset)
    }

    /// Bucket key of `timestamp` with boundaries aligned to local time
    ///
    /// Rounds the local wall-clock time, then converts the window start back
    /// to UTC. The identity policy returns `timestamp` unchanged.
    #[inline]
    pub fn bucket_key(&self, key_fn: BucketKeyFn, timestamp: Timestamp) -> i64 {
        match key_fn {
            BucketKeyFn::Identity => timestamp,
            BucketKeyFn::Interval(_) => key_fn
                .key(timestamp.saturating_add(self.offset_ms))
                .saturating_sub(self.offset_ms),
        }
    }

    pub fn offset_millis(&self) -> i64 {
        self.offset_ms
    }
}
