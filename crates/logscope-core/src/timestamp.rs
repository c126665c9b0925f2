//! Timestamp detection.
//!
//! Textual timestamps are tried against a fixed, ordered list of layouts
//! ([`TimestampLayout::ALL`]); the first that parses the whole string wins.
//! Layouts carrying a zone abbreviation (`MST`) are read as UTC and the
//! year-less `Stamp*` layouts take the current UTC year.

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Timelike, Utc,
};

/// A textual timestamp layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampLayout {
    /// `01/02 03:04:05PM '06 -0700`
    Layout,
    /// `Mon Jan  2 15:04:05 2006`
    Ansic,
    /// `Mon Jan  2 15:04:05 MST 2006`
    UnixDate,
    /// `Mon Jan 02 15:04:05 -0700 2006`
    RubyDate,
    /// `02 Jan 06 15:04 MST`
    Rfc822,
    /// `02 Jan 06 15:04 -0700`
    Rfc822Z,
    /// `Monday, 02-Jan-06 15:04:05 MST`
    Rfc850,
    /// `Mon, 02 Jan 2006 15:04:05 MST`
    Rfc1123,
    /// `Mon, 02 Jan 2006 15:04:05 -0700`
    Rfc1123Z,
    /// `2006-01-02T15:04:05Z07:00`
    Rfc3339,
    /// `2006-01-02T15:04:05.999999999Z07:00`
    Rfc3339Nano,
    /// `Jan  2 15:04:05`
    Stamp,
    /// `Jan  2 15:04:05.000`
    StampMilli,
    /// `Jan  2 15:04:05.000000`
    StampMicro,
    /// `Jan  2 15:04:05.000000000`
    StampNano,
}

/// Finest unit a layout can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precision {
    /// Whole minutes.
    Minute,
    /// Whole seconds.
    Second,
    /// Milliseconds.
    Milli,
    /// Microseconds.
    Micro,
    /// Nanoseconds.
    Nano,
}

enum Zone {
    Offset,
    AssumeUtc,
    CurrentYear,
}

impl TimestampLayout {
    /// Every layout, in the order they are tried.
    pub const ALL: [Self; 15] = [
        Self::Layout,
        Self::Ansic,
        Self::UnixDate,
        Self::RubyDate,
        Self::Rfc822,
        Self::Rfc822Z,
        Self::Rfc850,
        Self::Rfc1123,
        Self::Rfc1123Z,
        Self::Rfc3339,
        Self::Rfc3339Nano,
        Self::Stamp,
        Self::StampMilli,
        Self::StampMicro,
        Self::StampNano,
    ];

    const fn pattern(self) -> &'static str {
        match self {
            Self::Layout => "%m/%d %I:%M:%S%p '%y %z",
            Self::Ansic => "%a %b %e %H:%M:%S %Y",
            Self::UnixDate => "%a %b %e %H:%M:%S %Z %Y",
            Self::RubyDate => "%a %b %d %H:%M:%S %z %Y",
            Self::Rfc822 => "%d %b %y %H:%M %Z",
            Self::Rfc822Z => "%d %b %y %H:%M %z",
            Self::Rfc850 => "%A, %d-%b-%y %H:%M:%S %Z",
            Self::Rfc1123 => "%a, %d %b %Y %H:%M:%S %Z",
            Self::Rfc1123Z => "%a, %d %b %Y %H:%M:%S %z",
            Self::Rfc3339 | Self::Rfc3339Nano => "%+",
            Self::Stamp => "%b %e %H:%M:%S",
            Self::StampMilli => "%b %e %H:%M:%S%.3f",
            Self::StampMicro => "%b %e %H:%M:%S%.6f",
            Self::StampNano => "%b %e %H:%M:%S%.9f",
        }
    }

    const fn zone(self) -> Zone {
        match self {
            Self::Layout | Self::RubyDate | Self::Rfc822Z | Self::Rfc1123Z => Zone::Offset,
            Self::Rfc3339 | Self::Rfc3339Nano => Zone::Offset,
            Self::Ansic | Self::UnixDate | Self::Rfc822 | Self::Rfc850 | Self::Rfc1123 => {
                Zone::AssumeUtc
            }
            Self::Stamp | Self::StampMilli | Self::StampMicro | Self::StampNano => {
                Zone::CurrentYear
            }
        }
    }

    /// Finest unit this layout carries.
    #[must_use]
    pub const fn precision(self) -> Precision {
        match self {
            Self::Rfc822 | Self::Rfc822Z => Precision::Minute,
            Self::StampMilli => Precision::Milli,
            Self::StampMicro => Precision::Micro,
            Self::Rfc3339Nano | Self::StampNano => Precision::Nano,
            _ => Precision::Second,
        }
    }

    /// Returns true if the layout carries no year.
    #[must_use]
    pub const fn is_yearless(self) -> bool {
        matches!(self.zone(), Zone::CurrentYear)
    }

    /// Parses `input` with this layout.
    #[must_use]
    pub fn parse(self, input: &str) -> Option<DateTime<Utc>> {
        match self {
            Self::Rfc3339 | Self::Rfc3339Nano => DateTime::parse_from_rfc3339(input)
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
            _ => match self.zone() {
                Zone::Offset => DateTime::<FixedOffset>::parse_from_str(input, self.pattern())
                    .ok()
                    .map(|ts| ts.with_timezone(&Utc)),
                Zone::AssumeUtc if self.has_zone_abbreviation(input) => {
                    NaiveDateTime::parse_from_str(input, self.pattern())
                        .ok()
                        .map(|naive| naive.and_utc())
                }
                Zone::AssumeUtc => None,
                Zone::CurrentYear => {
                    let year = Utc::now().year();
                    let with_year = format!("{year} {input}");
                    let pattern = format!("%Y {}", self.pattern());
                    NaiveDateTime::parse_from_str(&with_year, &pattern)
                        .ok()
                        .map(|naive| naive.and_utc())
                }
            },
        }
    }

    /// A `%Z` slot only accepts letters, so numeric offsets fall through to
    /// the `-0700` layouts.
    fn has_zone_abbreviation(self, input: &str) -> bool {
        match self.pattern().split_whitespace().position(|t| t == "%Z") {
            Some(index) => input
                .split_whitespace()
                .nth(index)
                .is_some_and(|token| token.bytes().all(|b| b.is_ascii_alphabetic())),
            None => true,
        }
    }

    /// Formats `ts` with this layout, in UTC.
    #[must_use]
    pub fn format(self, ts: &DateTime<Utc>) -> String {
        match self {
            Self::Rfc3339 => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            Self::Rfc3339Nano => ts.to_rfc3339_opts(SecondsFormat::Nanos, true),
            _ => ts.format(self.pattern()).to_string(),
        }
    }

    /// Drops whatever `ts` carries below this layout's precision.
    #[must_use]
    pub fn truncate(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let nanos = ts.nanosecond() % 1_000_000_000;
        let kept = match self.precision() {
            Precision::Minute | Precision::Second => 0,
            Precision::Milli => nanos / 1_000_000 * 1_000_000,
            Precision::Micro => nanos / 1_000 * 1_000,
            Precision::Nano => nanos,
        };
        let secs = match self.precision() {
            Precision::Minute => ts.timestamp() - i64::from(ts.second()),
            _ => ts.timestamp(),
        };
        Utc.timestamp_opt(secs, kept).single().unwrap_or(ts)
    }
}

/// Parses a textual timestamp using the first matching layout.
#[must_use]
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    TimestampLayout::ALL
        .iter()
        .find_map(|layout| layout.parse(input))
}

/// Interprets a number as Unix seconds with a fractional part.
///
/// Non-finite or out of range values yield `None`.
#[must_use]
pub fn from_unix_seconds(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let mut secs = value.floor();
    let mut nanos = ((value - secs) * 1e9).round();
    if nanos >= 1e9 {
        secs += 1.0;
        nanos = 0.0;
    }
    if secs < i64::MIN as f64 || secs >= i64::MAX as f64 {
        return None;
    }
    Utc.timestamp_opt(secs as i64, nanos as u32).single()
}
