//! Calendar and timezone handling for interval-mean series.
//!
//! A [`Calendar`] enumerates the interval-start instants of one local
//! calendar year at a fixed [`Resolution`]. Slots are spaced uniformly in
//! absolute time; under the central European rule the local labels skip the
//! 02:00 hour on the last Sunday of March and repeat it on the last Sunday of
//! October, so a 365-day year always has 8760 hourly slots.

use crate::error::CalendarError;
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SECONDS_PER_HOUR: u32 = 3_600;
pub const SECONDS_PER_DAY: u32 = 86_400;

const CET_OFFSET_SECONDS: i32 = 3_600;
const CEST_OFFSET_SECONDS: i32 = 7_200;

/// Day-of-year index (0-based) of February 29th.
const LEAP_DAY_INDEX: usize = 59;

/// Length of one series interval, in seconds. Always divides one hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Resolution(u32);

impl Resolution {
    pub const MINUTE: Self = Self(60);
    pub const QUARTER_HOUR: Self = Self(900);
    pub const HOUR: Self = Self(3_600);

    /// Resolutions a region file may carry natively.
    pub const FILE_RESOLUTIONS: [Self; 3] = [Self::MINUTE, Self::QUARTER_HOUR, Self::HOUR];

    /// Create a resolution, rejecting values that do not evenly divide an hour
    pub fn new(seconds: u32) -> Result<Self, CalendarError> {
        if seconds == 0 || SECONDS_PER_HOUR % seconds != 0 {
            return Err(CalendarError::InvalidResolution { seconds });
        }
        Ok(Self(seconds))
    }

    pub fn seconds(self) -> u32 {
        self.0
    }

    pub fn slots_per_day(self) -> usize {
        (SECONDS_PER_DAY / self.0) as usize
    }

    pub fn is_file_resolution(self) -> bool {
        Self::FILE_RESOLUTIONS.contains(&self)
    }

    /// Number of `self` intervals that make up one `coarser` interval.
    pub fn subdivisions_of(self, coarser: Resolution) -> Result<usize, CalendarError> {
        if coarser.0 < self.0 || coarser.0 % self.0 != 0 {
            return Err(CalendarError::IncommensurateResolutions {
                from: coarser.0,
                to: self.0,
            });
        }
        Ok((coarser.0 / self.0) as usize)
    }
}

impl TryFrom<u32> for Resolution {
    type Error = CalendarError;

    fn try_from(seconds: u32) -> Result<Self, Self::Error> {
        Self::new(seconds)
    }
}

impl From<Resolution> for u32 {
    fn from(resolution: Resolution) -> Self {
        resolution.0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// How local wall-clock labels are derived from absolute instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimezoneRule {
    /// CET (UTC+1), switching to CEST (UTC+2) between 01:00 UTC on the last
    /// Sunday of March and 01:00 UTC on the last Sunday of October.
    #[default]
    CentralEuropean,
    /// A constant offset with no daylight saving.
    Fixed { offset_seconds: i32 },
}

impl TimezoneRule {
    pub const UTC: Self = Self::Fixed { offset_seconds: 0 };

    /// Fixed-offset rule, validated against chrono's offset range
    pub fn fixed(offset_seconds: i32) -> Result<Self, CalendarError> {
        FixedOffset::east_opt(offset_seconds).ok_or(CalendarError::InvalidOffset {
            seconds: offset_seconds,
        })?;
        Ok(Self::Fixed { offset_seconds })
    }

    /// Offset in effect outside daylight saving time.
    pub fn standard_offset(self) -> FixedOffset {
        match self {
            Self::CentralEuropean => offset(CET_OFFSET_SECONDS),
            Self::Fixed { offset_seconds } => offset(offset_seconds),
        }
    }

    /// Daylight saving window `[start, end)` in UTC for the given year.
    pub fn dst_window(self, year: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            Self::CentralEuropean => {
                let start = last_sunday(year, 3)?.and_hms_opt(1, 0, 0)?.and_utc();
                let end = last_sunday(year, 10)?.and_hms_opt(1, 0, 0)?.and_utc();
                Some((start, end))
            }
            Self::Fixed { .. } => None,
        }
    }

    pub fn is_dst(self, instant: DateTime<Utc>) -> bool {
        self.dst_window(instant.year())
            .is_some_and(|(start, end)| instant >= start && instant < end)
    }

    /// Offset that labels `instant` under this rule.
    pub fn offset_at(self, instant: DateTime<Utc>) -> FixedOffset {
        if self.is_dst(instant) {
            offset(CEST_OFFSET_SECONDS)
        } else {
            self.standard_offset()
        }
    }

    /// Local wall-clock label for an absolute instant.
    pub fn localize(self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset_at(instant))
    }
}

impl fmt::Display for TimezoneRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CentralEuropean => write!(f, "CET/CEST"),
            Self::Fixed { offset_seconds } => write!(f, "UTC{}", offset(*offset_seconds)),
        }
    }
}

/// Whether a timestamp falls inside central European summer time.
pub fn is_dst(timestamp: DateTime<FixedOffset>) -> bool {
    TimezoneRule::CentralEuropean.is_dst(timestamp.with_timezone(&Utc))
}

fn offset(seconds: i32) -> FixedOffset {
    FixedOffset::east_opt(seconds).unwrap_or_else(|| Utc.fix())
}

fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = first_of_next.pred_opt()?;
    let back = last.weekday().num_days_from_sunday();
    Some(last - Duration::days(i64::from(back)))
}

/// Treatment of February 29th in leap years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LeapDayPolicy {
    /// Omit February 29th so every series spans 365 days.
    #[default]
    Drop,
    /// Keep February 29th; leap-year series span 366 days.
    Keep,
}

/// Where an instant falls relative to a calendar's slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLookup {
    Slot(usize),
    /// Inside the year but not on an interval start.
    OffGrid,
    /// On February 29th of a leap year whose leap day is dropped.
    ExcludedLeapDay,
    OutOfRange,
}

/// Canonical interval-start timestamps for one local calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Calendar {
    year: i32,
    resolution: Resolution,
    rule: TimezoneRule,
    leap_day: LeapDayPolicy,
    start: DateTime<Utc>,
}

impl Calendar {
    pub fn new(
        year: i32,
        resolution: Resolution,
        rule: TimezoneRule,
        leap_day: LeapDayPolicy,
    ) -> Result<Self, CalendarError> {
        // Local midnight on January 1st is always standard time
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .and_then(|midnight| rule.standard_offset().from_local_datetime(&midnight).single())
            .map(|local| local.with_timezone(&Utc))
            .filter(|_| NaiveDate::from_ymd_opt(year + 1, 1, 1).is_some())
            .ok_or(CalendarError::UnsupportedYear { year })?;

        Ok(Self {
            year,
            resolution,
            rule,
            leap_day,
            start,
        })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn rule(&self) -> TimezoneRule {
        self.rule
    }

    pub fn leap_day(&self) -> LeapDayPolicy {
        self.leap_day
    }

    /// Same year, rule and leap policy at another resolution.
    pub fn with_resolution(&self, resolution: Resolution) -> Self {
        Self { resolution, ..*self }
    }

    pub fn is_leap_year(&self) -> bool {
        NaiveDate::from_ymd_opt(self.year, 2, 29).is_some()
    }

    fn drops_leap_day(&self) -> bool {
        self.is_leap_year() && self.leap_day == LeapDayPolicy::Drop
    }

    /// Days covered by the series (365, or 366 for a kept leap day).
    pub fn day_count(&self) -> usize {
        if self.is_leap_year() && self.leap_day == LeapDayPolicy::Keep {
            366
        } else {
            365
        }
    }

    pub fn len(&self) -> usize {
        self.day_count() * self.resolution.slots_per_day()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absolute start of the slot at `index`.
    pub fn instant_at(&self, index: usize) -> Option<DateTime<Utc>> {
        if index >= self.len() {
            return None;
        }
        let per_day = self.resolution.slots_per_day();
        let raw = if self.drops_leap_day() && index >= LEAP_DAY_INDEX * per_day {
            index + per_day
        } else {
            index
        };
        let offset_seconds = raw as i64 * i64::from(self.resolution.seconds());
        Some(self.start + Duration::seconds(offset_seconds))
    }

    /// Local wall-clock label of the slot at `index`.
    pub fn timestamp_at(&self, index: usize) -> Option<DateTime<FixedOffset>> {
        self.instant_at(index)
            .map(|instant| self.rule.localize(instant))
    }

    pub fn index_of(&self, instant: DateTime<Utc>) -> SlotLookup {
        let elapsed = (instant - self.start).num_seconds();
        let span_days: i64 = if self.is_leap_year() { 366 } else { 365 };
        if elapsed < 0 || elapsed >= span_days * i64::from(SECONDS_PER_DAY) {
            return SlotLookup::OutOfRange;
        }

        let step = i64::from(self.resolution.seconds());
        if elapsed % step != 0 {
            return SlotLookup::OffGrid;
        }

        let raw = (elapsed / step) as usize;
        if !self.drops_leap_day() {
            return SlotLookup::Slot(raw);
        }

        let per_day = self.resolution.slots_per_day();
        let leap_start = LEAP_DAY_INDEX * per_day;
        if raw < leap_start {
            SlotLookup::Slot(raw)
        } else if raw < leap_start + per_day {
            SlotLookup::ExcludedLeapDay
        } else {
            SlotLookup::Slot(raw - per_day)
        }
    }

    /// Lazily enumerate every slot label. Each call restarts from January 1st.
    pub fn iter(&self) -> Timestamps {
        Timestamps {
            calendar: *self,
            next: 0,
            end: self.len(),
        }
    }
}

impl IntoIterator for &Calendar {
    type Item = DateTime<FixedOffset>;
    type IntoIter = Timestamps;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Finite iterator over a calendar's interval-start labels.
#[derive(Debug, Clone)]
pub struct Timestamps {
    calendar: Calendar,
    next: usize,
    end: usize,
}

impl Iterator for Timestamps {
    type Item = DateTime<FixedOffset>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let timestamp = self.calendar.timestamp_at(self.next);
        self.next += 1;
        timestamp
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Timestamps {}

/// Interval-start labels of a CET/CEST year at `delta_seconds`, dropping
/// February 29th in leap years.
pub fn timestamps_for(year: i32, delta_seconds: u32) -> Result<Timestamps, CalendarError> {
    let resolution = Resolution::new(delta_seconds)?;
    let calendar = Calendar::new(
        year,
        resolution,
        TimezoneRule::CentralEuropean,
        LeapDayPolicy::Drop,
    )?;
    Ok(calendar.iter())
}
