//! Half-open date ranges and calendar-day chunking
//!
//! A [`DateRange`] is always `[start, end)`. [`split`] decomposes it into
//! contiguous, non-overlapping [`DateChunk`]s whose interior edges fall on
//! UTC midnight. The first chunk keeps the original `start` and the last one is
//! clipped to the original `end`, so the chunks cover the range exactly even when
//! the caller passed full timestamps instead of dates.
//!
//! Splitting is pure: the same range and granularity always yield the same
//! chunks, which is what makes chunk-level resumption idempotent.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors building ranges or chunk sequences
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// Input was neither `YYYY-MM-DD` nor an RFC 3339 timestamp
    #[error("invalid date or timestamp: {0}")]
    InvalidBoundary(String),

    /// End lies before start
    #[error("range end ({end}) is before start ({start})")]
    Inverted {
        /// Requested start
        start: DateTime<Utc>,
        /// Requested end
        end: DateTime<Utc>,
    },

    /// Chunk granularity must be at least one day
    #[error("chunk granularity must be at least 1 day")]
    ZeroGranularity,
}

/// Half-open time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    /// Create a range; `start == end` is allowed and yields no chunks
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, RangeError> {
        if end < start {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse user-facing boundaries
    ///
    /// Both sides accept `YYYY-MM-DD` or RFC 3339 (a timestamp without offset is
    /// read as UTC). A date-only `end` names the last included day, so it is
    /// normalized to the following midnight; timestamps are taken as-is.
    pub fn parse(start: &str, end: &str) -> Result<Self, RangeError> {
        let start = parse_boundary(start, false)?;
        let end = parse_boundary(end, true)?;
        Self::new(start, end)
    }

    /// Inclusive start
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether the range contains no instant
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// One bounded sub-interval of a job's range, `[start, end)` with `start < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateChunk {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateChunk {
    /// Build a chunk; returns `None` unless `start < end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Inclusive start
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Stable textual key (`start..end`, RFC 3339) for stores and logs
    pub fn key(&self) -> String {
        format!("{}..{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

impl std::fmt::Display for DateChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Lazy, restartable sequence of chunks produced by [`split`]
///
/// Cloning the iterator restarts nothing; call [`split`] again (or clone
/// before iterating) to replay the identical sequence.
#[derive(Debug, Clone)]
pub struct DateChunks {
    range: DateRange,
    anchor: DateTime<Utc>,
    granularity_days: i64,
    index: i64,
}

impl Iterator for DateChunks {
    type Item = DateChunk;

    fn next(&mut self) -> Option<Self::Item> {
        let lower = self.edge(self.index).max(self.range.start);
        if lower >= self.range.end {
            return None;
        }
        let upper = self.edge(self.index + 1);
        self.index += 1;
        DateChunk::new(lower, upper)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.range.is_empty() {
            return (0, Some(0));
        }
        let span_days = (self.range.end - self.anchor).num_seconds() as f64 / 86_400.0;
        let total = (span_days / self.granularity_days as f64).ceil() as i64;
        let remaining = (total - self.index).max(0) as usize;
        (remaining, Some(remaining))
    }
}

impl DateChunks {
    /// Chunk edge `index`, clamped to the range end; an edge past the calendar limit is the end
    fn edge(&self, index: i64) -> DateTime<Utc> {
        self.granularity_days
            .checked_mul(index)
            .and_then(chrono::Duration::try_days)
            .and_then(|offset| self.anchor.checked_add_signed(offset))
            .map_or(self.range.end, |edge| edge.min(self.range.end))
    }
}

/// Decompose `range` into chunks of `granularity_days` calendar days
///
/// - an empty range yields no chunks
/// - a range shorter than one unit yields exactly one chunk equal to the range
/// - the final chunk is clipped to `range.end()`
pub fn split(range: &DateRange, granularity_days: u32) -> Result<DateChunks, RangeError> {
    if granularity_days == 0 {
        return Err(RangeError::ZeroGranularity);
    }
    Ok(DateChunks {
        range: *range,
        anchor: midnight(range.start.date_naive()),
        granularity_days: i64::from(granularity_days),
        index: 0,
    })
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::default()).and_utc()
}

/// Try to parse an RFC 3339 timestamp, reading offset-less input as UTC
fn try_parse_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    DateTime::parse_from_rfc3339(&format!("{input}Z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_boundary(input: &str, is_end: bool) -> Result<DateTime<Utc>, RangeError> {
    let input = input.trim();
    if let Some(ts) = try_parse_rfc3339(input) {
        return Ok(ts);
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| RangeError::InvalidBoundary(input.to_string()))?;
    if is_end {
        let next = date
            .succ_opt()
            .ok_or_else(|| RangeError::InvalidBoundary(input.to_string()))?;
        Ok(midnight(next))
    } else {
        Ok(midnight(date))
    }
}
