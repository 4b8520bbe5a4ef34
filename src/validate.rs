//! Physical and calendar consistency checks.
//!
//! The validator walks a whole series and collects every violation into a
//! [`ValidationReport`]. It never stops early; whether violations are fatal
//! is decided by the caller.

use crate::calendar::Calendar;
use crate::config::{ConsistencyConfig, IrradianceCeiling};
use crate::models::{Channel, Observation, Region, Series};
use crate::solar::interval_sun;
use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// What a single violation is about.
#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    /// Global horizontal differs from direct horizontal plus diffuse.
    ClosureMismatch { global: f64, components: f64 },
    NegativeIrradiance { channel: Channel, value: f64 },
    AboveCeiling { channel: Channel, value: f64, ceiling: f64 },
    AlbedoOutOfRange { value: f64 },
    /// Timestamp not later than its predecessor.
    NonMonotonic,
    /// Timestamp differs from the calendar slot at its position.
    CalendarMismatch { expected: DateTime<FixedOffset> },
    /// Observation count differs from the calendar length.
    CountMismatch { expected: usize, found: usize },
}

impl ViolationKind {
    /// Short label used when summarizing reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::ClosureMismatch { .. } => "closure",
            Self::NegativeIrradiance { .. } => "negative_irradiance",
            Self::AboveCeiling { .. } => "above_ceiling",
            Self::AlbedoOutOfRange { .. } => "albedo_range",
            Self::NonMonotonic => "non_monotonic",
            Self::CalendarMismatch { .. } => "calendar_mismatch",
            Self::CountMismatch { .. } => "count_mismatch",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClosureMismatch { global, components } => write!(
                f,
                "global horizontal {global:.2} W/m² vs direct + diffuse {components:.2} W/m²"
            ),
            Self::NegativeIrradiance { channel, value } => {
                write!(f, "{channel} is negative ({value})")
            }
            Self::AboveCeiling {
                channel,
                value,
                ceiling,
            } => write!(f, "{channel} {value:.2} exceeds ceiling {ceiling:.2}"),
            Self::AlbedoOutOfRange { value } => write!(f, "surface albedo {value} outside [0, 1]"),
            Self::NonMonotonic => f.write_str("timestamp does not increase"),
            Self::CalendarMismatch { expected } => {
                write!(f, "timestamp differs from calendar slot {}", expected.to_rfc3339())
            }
            Self::CountMismatch { expected, found } => {
                write!(f, "{found} observations, calendar has {expected}")
            }
        }
    }
}

/// One itemized violation.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Position in the series, `None` for series-level violations
    pub index: Option<usize>,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.index, self.timestamp) {
            (Some(index), Some(timestamp)) => {
                write!(f, "[{index}] {}: {}", timestamp.to_rfc3339(), self.kind)
            }
            _ => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

/// Outcome of validating a series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    observations_checked: usize,
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn verdict(&self) -> Verdict {
        if self.passed() {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn observations_checked(&self) -> usize {
        self.observations_checked
    }

    /// Violation counts keyed by [`ViolationKind::label`]
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for violation in &self.violations {
            *counts.entry(violation.kind.label()).or_insert(0) += 1;
        }
        counts
    }

    fn push(&mut self, index: usize, observation: &Observation, kind: ViolationKind) {
        self.violations.push(Violation {
            index: Some(index),
            timestamp: Some(observation.timestamp),
            kind,
        });
    }
}

/// Checks series against a [`ConsistencyConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyValidator {
    config: ConsistencyConfig,
}

impl ConsistencyValidator {
    pub fn new(config: ConsistencyConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, series: &Series) -> ValidationReport {
        self.validate_observations(series.calendar(), series.region(), series.observations())
    }

    /// Validate observations that may not yet form a well-formed series.
    pub fn validate_observations(
        &self,
        calendar: &Calendar,
        region: Option<&Region>,
        observations: &[Observation],
    ) -> ValidationReport {
        let mut report = ValidationReport {
            observations_checked: observations.len(),
            violations: Vec::new(),
        };

        if observations.len() != calendar.len() {
            report.violations.push(Violation {
                index: None,
                timestamp: None,
                kind: ViolationKind::CountMismatch {
                    expected: calendar.len(),
                    found: observations.len(),
                },
            });
        }

        let seconds = calendar.resolution().seconds();
        let mut previous: Option<DateTime<FixedOffset>> = None;

        for (index, (observation, slot)) in observations.iter().zip(calendar.iter()).enumerate() {
            if previous.is_some_and(|prev| observation.timestamp <= prev) {
                report.push(index, observation, ViolationKind::NonMonotonic);
            } else if observation.timestamp != slot {
                report.push(index, observation, ViolationKind::CalendarMismatch { expected: slot });
            }
            previous = Some(observation.timestamp);

            self.check_closure(&mut report, index, observation);
            self.check_irradiance(&mut report, index, observation, region, seconds);

            if let Some(albedo) = observation.get(Channel::SurfaceAlbedo) {
                if !(0.0..=1.0).contains(&albedo) {
                    report.push(index, observation, ViolationKind::AlbedoOutOfRange { value: albedo });
                }
            }
        }

        debug!(
            "Validated {} observations: {} violations",
            report.observations_checked,
            report.violations.len()
        );
        report
    }

    fn check_closure(&self, report: &mut ValidationReport, index: usize, observation: &Observation) {
        let (Some(global), Some(direct), Some(diffuse)) = (
            observation.get(Channel::GlobalHorizontalIrradiance),
            observation.get(Channel::DirectHorizontalIrradiance),
            observation.get(Channel::DiffuseIrradiance),
        ) else {
            return;
        };
        let components = direct + diffuse;
        if !self.config.closure.allows(global, components) {
            report.push(
                index,
                observation,
                ViolationKind::ClosureMismatch { global, components },
            );
        }
    }

    fn check_irradiance(
        &self,
        report: &mut ValidationReport,
        index: usize,
        observation: &Observation,
        region: Option<&Region>,
        seconds: u32,
    ) {
        let mut ceilings: Option<(f64, f64)> = None;

        for channel in Channel::IRRADIANCE {
            let Some(value) = observation.get(channel) else {
                continue;
            };
            if value < 0.0 {
                report.push(index, observation, ViolationKind::NegativeIrradiance { channel, value });
                continue;
            }

            let (horizontal, normal) =
                *ceilings.get_or_insert_with(|| self.ceilings(observation, region, seconds));
            let ceiling = match channel {
                Channel::DirectNormalIrradiance | Channel::DirectIrradiance => normal,
                _ => horizontal,
            };
            if value > ceiling {
                report.push(
                    index,
                    observation,
                    ViolationKind::AboveCeiling {
                        channel,
                        value,
                        ceiling,
                    },
                );
            }
        }
    }

    /// Horizontal and beam-normal ceilings for one interval.
    fn ceilings(&self, observation: &Observation, region: Option<&Region>, seconds: u32) -> (f64, f64) {
        match self.config.ceiling {
            IrradianceCeiling::Constant { w_m2 } => (w_m2, w_m2),
            IrradianceCeiling::Extraterrestrial { margin, slack_w_m2 } => {
                let (latitude, longitude) =
                    region.map_or((0.0, 0.0), |region| (region.latitude, region.longitude));
                let sun = interval_sun(observation.instant(), seconds, latitude, longitude);
                let normal = sun.extraterrestrial_normal * margin + slack_w_m2;
                let horizontal = match region {
                    Some(_) => sun.extraterrestrial_normal * sun.max_cos_zenith * margin + slack_w_m2,
                    None => normal,
                };
                (horizontal, normal)
            }
        }
    }
}

/// Validate a series with the default consistency configuration.
pub fn validate(series: &Series) -> ValidationReport {
    ConsistencyValidator::default().validate(series)
}
