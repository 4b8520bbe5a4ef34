//! Configuration for loading, resampling and validation.
//!
//! Dataset-specific constants (closure tolerances, the irradiance ceiling)
//! live here as parameters with documented defaults rather than at the
//! check sites.

use crate::calendar::{LeapDayPolicy, Resolution, TimezoneRule};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Combined relative and absolute tolerance: `|a - b| <= absolute + relative * |a|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub relative: f64,
    pub absolute: f64,
}

impl Tolerance {
    pub fn new(relative: f64, absolute: f64) -> Self {
        Self { relative, absolute }
    }

    /// Whether `actual` is within tolerance of `expected`
    pub fn allows(&self, expected: f64, actual: f64) -> bool {
        (expected - actual).abs() <= self.absolute + self.relative * expected.abs()
    }
}

/// Upper bound applied to irradiance channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IrradianceCeiling {
    /// Extraterrestrial irradiance for the interval (projected onto the
    /// horizontal when the region latitude is known), scaled by `margin` to
    /// admit cloud enhancement, plus `slack_w_m2`.
    Extraterrestrial { margin: f64, slack_w_m2: f64 },
    /// A single bound for every timestamp.
    Constant { w_m2: f64 },
}

impl Default for IrradianceCeiling {
    fn default() -> Self {
        Self::Extraterrestrial {
            margin: 1.1,
            slack_w_m2: 5.0,
        }
    }
}

/// Physical consistency checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    /// Allowed gap between global and direct + diffuse horizontal
    pub closure: Tolerance,
    pub ceiling: IrradianceCeiling,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            closure: Tolerance::new(0.05, 5.0),
            ceiling: IrradianceCeiling::default(),
        }
    }
}

/// Global configuration for a resampling engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Resolution of assembled output series
    pub target_resolution: Resolution,

    /// Rule used to interpret embedded offsets
    pub timezone: TimezoneRule,

    pub leap_day: LeapDayPolicy,

    /// How closely a reconstructed series must downsample back to its source
    pub closure_tolerance: Tolerance,

    pub consistency: ConsistencyConfig,

    /// Shift interpolated sub-intervals so each source interval mean is kept
    pub preserve_interval_means: bool,

    /// Treat validation violations as fatal
    pub strict_validation: bool,

    /// Upper bound on reading one region file
    pub load_timeout: Duration,

    /// Region files assembled concurrently in batch mode
    pub max_concurrent_regions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_resolution: Resolution::QUARTER_HOUR,
            timezone: TimezoneRule::CentralEuropean,
            leap_day: LeapDayPolicy::Drop,
            closure_tolerance: Tolerance::new(1e-6, 1e-6),
            consistency: ConsistencyConfig::default(),
            preserve_interval_means: true,
            strict_validation: false,
            load_timeout: Duration::from_secs(30),
            max_concurrent_regions: num_cpus::get(),
        }
    }
}

impl EngineConfig {
    pub fn with_target_resolution(mut self, resolution: Resolution) -> Self {
        self.target_resolution = resolution;
        self
    }

    pub fn with_timezone(mut self, timezone: TimezoneRule) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_leap_day(mut self, leap_day: LeapDayPolicy) -> Self {
        self.leap_day = leap_day;
        self
    }

    pub fn with_closure_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.closure_tolerance = tolerance;
        self
    }

    pub fn with_consistency(mut self, consistency: ConsistencyConfig) -> Self {
        self.consistency = consistency;
        self
    }

    /// Use plain interpolation without the mean-preserving correction
    pub fn without_mean_preservation(mut self) -> Self {
        self.preserve_interval_means = false;
        self
    }

    /// Fail assemblies whose validation report has violations
    pub fn with_strict_validation(mut self) -> Self {
        self.strict_validation = true;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_regions(mut self, regions: usize) -> Self {
        self.max_concurrent_regions = regions.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_combines_relative_and_absolute() {
        let tolerance = Tolerance::new(0.05, 5.0);
        assert!(tolerance.allows(600.0, 634.0));
        assert!(!tolerance.allows(600.0, 636.0));
        assert!(tolerance.allows(0.0, 4.9));
        assert!(!tolerance.allows(0.0, 5.1));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = EngineConfig::default()
            .with_target_resolution(Resolution::MINUTE)
            .with_strict_validation()
            .without_mean_preservation()
            .with_max_concurrent_regions(0);

        assert_eq!(config.target_resolution, Resolution::MINUTE);
        assert!(config.strict_validation);
        assert!(!config.preserve_interval_means);
        assert_eq!(config.max_concurrent_regions, 1);
        assert_eq!(config.leap_day, LeapDayPolicy::Drop);
    }
}
