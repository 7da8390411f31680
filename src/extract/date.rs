//! Normalization of the timestamps shown on index pages
//!
//! Index pages render a thread's post date differently depending on how
//! recent it is: a Unix timestamp, `昨天 HH:MM`, a bare `HH:MM` for today,
//! or `YYYY-MM-DD` for anything older. All of these are mapped onto a
//! wall-clock instant in the board's timezone.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

/// Marker the site uses for "yesterday"
pub const YESTERDAY_MARKER: &str = "昨天";

/// Marker the site occasionally uses for "today"
pub const TODAY_MARKER: &str = "今天";

/// Canonical string form of an instant
pub const INSTANT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static UNIX_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+$").expect("valid regex"));

static TRAILING_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(\d{1,2}):(\d{2})$").expect("valid regex"));

static CALENDAR_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[ T](\d{1,2}):(\d{2})(?::(\d{2}))?)?$")
        .expect("valid regex")
});

static TIME_OF_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?:{}\s*)?(\d{{1,2}}):(\d{{2}})$", TODAY_MARKER)).expect("valid regex")
});

/// Instant recorded for dates that cannot be understood
pub fn epoch_sentinel() -> NaiveDateTime {
    NaiveDateTime::default()
}

/// Renders an instant in its canonical form, e.g. `2024-01-03 10:00:00`
pub fn format_instant(instant: &NaiveDateTime) -> String {
    instant.format(INSTANT_FORMAT).to_string()
}

/// Maps raw post-date strings onto instants in the board's wall clock
///
/// `normalize` never fails: anything it does not recognize becomes
/// [`epoch_sentinel`]. The current time is always supplied by the caller.
#[derive(Debug, Clone, Copy)]
pub struct DateNormalizer {
    offset: FixedOffset,
}

impl DateNormalizer {
    /// Creates a normalizer for a board whose clock runs at `offset`
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Normalizes `raw` relative to `now`
    ///
    /// Recognized forms, first match wins:
    ///
    /// | Input | Result |
    /// |-------|--------|
    /// | `1704150000` | Unix timestamp, shifted into the board's offset |
    /// | `昨天 10:00` | `now`'s date minus one day, at 10:00 |
    /// | `2024-01-03` | that date at 00:00 (a trailing `HH:MM[:SS]` is kept) |
    /// | `10:00`, `今天 10:00` | `now`'s date at 10:00 |
    /// | anything else | the epoch sentinel |
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::{FixedOffset, NaiveDate};
    /// use forum_sweep::extract::{format_instant, DateNormalizer};
    ///
    /// let normalizer = DateNormalizer::new(FixedOffset::east_opt(8 * 3600).unwrap());
    /// let now = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_hms_opt(12, 0, 0).unwrap();
    ///
    /// let instant = normalizer.normalize("昨天 10:00", now);
    /// assert_eq!(format_instant(&instant), "2024-01-04 10:00:00");
    /// ```
    pub fn normalize(&self, raw: &str, now: NaiveDateTime) -> NaiveDateTime {
        let raw = raw.trim();

        if UNIX_TIMESTAMP.is_match(raw) {
            return self.timestamp_to_local(raw).unwrap_or_else(epoch_sentinel);
        }

        if raw.contains(YESTERDAY_MARKER) {
            return parse_time(&TRAILING_TIME, raw)
                .and_then(|time| {
                    now.date()
                        .checked_sub_signed(Duration::days(1))
                        .map(|day| day.and_time(time))
                })
                .unwrap_or_else(epoch_sentinel);
        }

        if let Some(caps) = CALENDAR_DATE.captures(raw) {
            return parse_calendar(&caps).unwrap_or_else(epoch_sentinel);
        }

        if TIME_OF_DAY.is_match(raw) {
            return parse_time(&TIME_OF_DAY, raw)
                .map(|time| now.date().and_time(time))
                .unwrap_or_else(epoch_sentinel);
        }

        epoch_sentinel()
    }

    /// Converts a Unix timestamp into the board's wall clock
    ///
    /// Years outside `0..=9999` have no four-digit canonical form and are
    /// rejected.
    fn timestamp_to_local(&self, raw: &str) -> Option<NaiveDateTime> {
        let secs: i64 = raw.parse().ok()?;
        let local = DateTime::from_timestamp(secs, 0)?
            .with_timezone(&self.offset)
            .naive_local();
        (0..=9999).contains(&local.year()).then_some(local)
    }
}

/// Reads `HH:MM` from the first two capture groups of `pattern`
fn parse_time(pattern: &Regex, raw: &str) -> Option<NaiveTime> {
    let caps = pattern.captures(raw)?;
    let hour = caps.get(1)?.as_str().parse().ok()?;
    let minute = caps.get(2)?.as_str().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn parse_calendar(caps: &regex::Captures<'_>) -> Option<NaiveDateTime> {
    let number = |i: usize| -> Option<u32> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };

    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, number(2)?, number(3)?)?;
    let time = NaiveTime::from_hms_opt(number(4)?, number(5)?, number(6)?)?;
    Some(date.and_time(time))
}
