//! Core data structures for TMY time series.
//!
//! Every [`Observation`] timestamp marks the start of an interval; channel
//! values are means over `[t, t + Δ)`, never instantaneous readings.

use crate::calendar::{Calendar, Resolution, TimezoneRule};
use crate::error::CalendarError;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const CHANNEL_COUNT: usize = 10;

/// Measured quantities carried by a region file, in file column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    Temperature,
    Pressure,
    WindDirection,
    WindSpeed,
    SurfaceAlbedo,
    DirectIrradiance,
    DiffuseIrradiance,
    DirectHorizontalIrradiance,
    DirectNormalIrradiance,
    GlobalHorizontalIrradiance,
}

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::Temperature,
        Channel::Pressure,
        Channel::WindDirection,
        Channel::WindSpeed,
        Channel::SurfaceAlbedo,
        Channel::DirectIrradiance,
        Channel::DiffuseIrradiance,
        Channel::DirectHorizontalIrradiance,
        Channel::DirectNormalIrradiance,
        Channel::GlobalHorizontalIrradiance,
    ];

    /// Slowly varying channels, resampled by interpolation.
    pub const SLOW: [Channel; 5] = [
        Channel::Temperature,
        Channel::Pressure,
        Channel::WindDirection,
        Channel::WindSpeed,
        Channel::SurfaceAlbedo,
    ];

    /// Radiation channels, resampled by a reconstruction strategy.
    pub const IRRADIANCE: [Channel; 5] = [
        Channel::DirectIrradiance,
        Channel::DiffuseIrradiance,
        Channel::DirectHorizontalIrradiance,
        Channel::DirectNormalIrradiance,
        Channel::GlobalHorizontalIrradiance,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Column name used in output files
    pub fn name(self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::Pressure => "pressure",
            Channel::WindDirection => "wind_direction",
            Channel::WindSpeed => "wind_speed",
            Channel::SurfaceAlbedo => "surface_albedo",
            Channel::DirectIrradiance => "direct_irradiance",
            Channel::DiffuseIrradiance => "diffuse_irradiance",
            Channel::DirectHorizontalIrradiance => "direct_horizontal_irradiance",
            Channel::DirectNormalIrradiance => "direct_normal_irradiance",
            Channel::GlobalHorizontalIrradiance => "global_horizontal_irradiance",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Channel::Temperature => "°C",
            Channel::Pressure => "hPa",
            Channel::WindDirection => "degrees",
            Channel::WindSpeed => "m/s",
            Channel::SurfaceAlbedo => "1",
            _ => "W/m²",
        }
    }

    pub fn is_irradiance(self) -> bool {
        Self::IRRADIANCE.contains(&self)
    }

    /// Physically admissible range of interval means
    pub fn valid_range(self) -> (f64, f64) {
        match self {
            Channel::Temperature | Channel::WindDirection => (f64::NEG_INFINITY, f64::INFINITY),
            Channel::SurfaceAlbedo => (0.0, 1.0),
            _ => (0.0, f64::INFINITY),
        }
    }

    /// Angular channels must be averaged on the unit circle.
    pub fn is_circular(self) -> bool {
        matches!(self, Channel::WindDirection)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type ChannelValues = [Option<f64>; CHANNEL_COUNT];

/// Interval means of one channel, one entry per calendar slot.
pub type Column = Vec<Option<f64>>;

/// One interval-mean sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: DateTime<FixedOffset>,
    pub values: ChannelValues,
}

impl Observation {
    /// An observation with every channel absent
    pub fn new(timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            timestamp,
            values: [None; CHANNEL_COUNT],
        }
    }

    pub fn get(&self, channel: Channel) -> Option<f64> {
        self.values[channel.index()]
    }

    pub fn set(&mut self, channel: Channel, value: Option<f64>) {
        self.values[channel.index()] = value;
    }

    pub fn with(mut self, channel: Channel, value: f64) -> Self {
        self.set(channel, Some(value));
        self
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.timestamp.with_timezone(&Utc)
    }
}

/// Region metadata owned by the dataset catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl Region {
    pub fn new(id: impl Into<String>, name: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            longitude,
            latitude,
        }
    }
}

/// A subset of channels stored column-wise, all of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelColumns {
    columns: BTreeMap<Channel, Column>,
}

impl ChannelColumns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: Channel, column: Column) {
        self.columns.insert(channel, column);
    }

    pub fn get(&self, channel: Channel) -> Option<&Column> {
        self.columns.get(&channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.columns.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, &Column)> + '_ {
        self.columns.iter().map(|(channel, column)| (*channel, column))
    }

    /// Absorb the columns of `other`, replacing any channel present in both
    pub fn merge(mut self, other: ChannelColumns) -> Self {
        self.columns.extend(other.columns);
        self
    }
}

/// A complete, gap-free year of interval means at one resolution.
///
/// Observations line up one-to-one with the slots of the series calendar.
/// A series is never mutated after construction; transformations build a
/// new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    calendar: Calendar,
    region: Option<Region>,
    observations: Vec<Observation>,
}

impl Series {
    /// Build a series from pre-aligned observations.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError`] if the observation count or any timestamp
    /// disagrees with the calendar.
    pub fn from_observations(
        calendar: Calendar,
        region: Option<Region>,
        observations: Vec<Observation>,
    ) -> Result<Self, CalendarError> {
        if observations.len() != calendar.len() {
            return Err(CalendarError::LengthMismatch {
                expected: calendar.len(),
                found: observations.len(),
            });
        }

        for (index, (observation, expected)) in observations.iter().zip(calendar.iter()).enumerate() {
            if observation.timestamp != expected {
                return Err(CalendarError::TimestampMismatch {
                    index,
                    expected: expected.to_rfc3339(),
                    found: observation.timestamp.to_rfc3339(),
                });
            }
        }

        Ok(Self {
            calendar,
            region,
            observations,
        })
    }

    /// Build a series from channel columns; channels without a column are absent.
    pub fn from_columns(
        calendar: Calendar,
        region: Option<Region>,
        columns: &ChannelColumns,
    ) -> Result<Self, CalendarError> {
        for (_, column) in columns.iter() {
            if column.len() != calendar.len() {
                return Err(CalendarError::LengthMismatch {
                    expected: calendar.len(),
                    found: column.len(),
                });
            }
        }

        let observations = calendar
            .iter()
            .enumerate()
            .map(|(index, timestamp)| {
                let mut observation = Observation::new(timestamp);
                for (channel, column) in columns.iter() {
                    observation.set(channel, column[index]);
                }
                observation
            })
            .collect();

        Ok(Self {
            calendar,
            region,
            observations,
        })
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn resolution(&self) -> Resolution {
        self.calendar.resolution()
    }

    pub fn year(&self) -> i32 {
        self.calendar.year()
    }

    pub fn rule(&self) -> TimezoneRule {
        self.calendar.rule()
    }

    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn get(&self, index: usize) -> Option<&Observation> {
        self.observations.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.observations.iter()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn column(&self, channel: Channel) -> Column {
        self.observations
            .iter()
            .map(|observation| observation.get(channel))
            .collect()
    }

    pub fn columns(&self, channels: &[Channel]) -> ChannelColumns {
        let mut columns = ChannelColumns::new();
        for &channel in channels {
            columns.insert(channel, self.column(channel));
        }
        columns
    }

    pub fn missing_count(&self, channel: Channel) -> usize {
        self.observations
            .iter()
            .filter(|observation| observation.get(channel).is_none())
            .count()
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.iter()
    }
}
