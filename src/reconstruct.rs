//! Sub-hourly irradiance reconstruction.
//!
//! Radiation changes too quickly for linear interpolation, so fine-resolution
//! irradiance is produced by a pluggable [`ReconstructionStrategy`]. Whatever
//! the strategy, [`reconstruct`] enforces the closure contract: block means
//! of the fine series must reproduce the coarse series within tolerance.

use crate::calendar::{Calendar, Resolution};
use crate::config::Tolerance;
use crate::error::ReconstructionError;
use crate::models::{Channel, ChannelColumns, Column, Region, Series};
use crate::resample::downsample_column;
use crate::solar::interval_sun;
use std::fmt;
use tracing::debug;

/// Auxiliary inputs a strategy may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuxiliaryKind {
    /// Clear-sky global and direct normal irradiance at the target resolution
    ClearSky,
    /// Interval-mean cosine of the solar zenith angle at the target resolution
    SolarPosition,
}

impl fmt::Display for AuxiliaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuxiliaryKind::ClearSky => f.write_str("clear-sky irradiance"),
            AuxiliaryKind::SolarPosition => f.write_str("solar position"),
        }
    }
}

/// Auxiliary channels aligned with the fine calendar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxiliaryChannels {
    clear_sky_ghi: Option<Vec<f64>>,
    clear_sky_dni: Option<Vec<f64>>,
    cos_zenith: Option<Vec<f64>>,
}

impl AuxiliaryChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clear_sky(mut self, ghi: Vec<f64>, dni: Vec<f64>) -> Self {
        self.clear_sky_ghi = Some(ghi);
        self.clear_sky_dni = Some(dni);
        self
    }

    pub fn with_cos_zenith(mut self, cos_zenith: Vec<f64>) -> Self {
        self.cos_zenith = Some(cos_zenith);
        self
    }

    /// Compute every auxiliary channel for `calendar` at the region's location.
    pub fn for_region(calendar: &Calendar, region: &Region) -> Self {
        let seconds = calendar.resolution().seconds();
        let mut ghi = Vec::with_capacity(calendar.len());
        let mut dni = Vec::with_capacity(calendar.len());
        let mut cos_zenith = Vec::with_capacity(calendar.len());

        for index in 0..calendar.len() {
            let Some(start) = calendar.instant_at(index) else {
                break;
            };
            let sun = interval_sun(start, seconds, region.latitude, region.longitude);
            ghi.push(sun.clear_sky_ghi);
            dni.push(sun.clear_sky_dni);
            cos_zenith.push(sun.mean_cos_zenith);
        }

        Self::new().with_clear_sky(ghi, dni).with_cos_zenith(cos_zenith)
    }

    pub fn provides(&self, kind: AuxiliaryKind) -> bool {
        match kind {
            AuxiliaryKind::ClearSky => self.clear_sky_ghi.is_some() && self.clear_sky_dni.is_some(),
            AuxiliaryKind::SolarPosition => self.cos_zenith.is_some(),
        }
    }

    pub fn clear_sky_ghi(&self) -> Option<&[f64]> {
        self.clear_sky_ghi.as_deref()
    }

    pub fn clear_sky_dni(&self) -> Option<&[f64]> {
        self.clear_sky_dni.as_deref()
    }

    pub fn cos_zenith(&self) -> Option<&[f64]> {
        self.cos_zenith.as_deref()
    }
}

/// A method for synthesizing fine-resolution irradiance from coarse means.
///
/// Implementations receive a coarse series without gaps in the irradiance
/// channels and every auxiliary input listed by
/// [`required_auxiliary`](Self::required_auxiliary). They return one column
/// per irradiance channel, `factor` values per coarse interval.
pub trait ReconstructionStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn required_auxiliary(&self) -> &[AuxiliaryKind] {
        &[]
    }

    fn reconstruct(
        &self,
        coarse: &Series,
        target: Resolution,
        auxiliary: &AuxiliaryChannels,
    ) -> Result<ChannelColumns, ReconstructionError>;
}

/// Piecewise-constant baseline: every sub-interval repeats the coarse mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformReconstructor;

impl ReconstructionStrategy for UniformReconstructor {
    fn name(&self) -> &str {
        "uniform"
    }

    fn reconstruct(
        &self,
        coarse: &Series,
        target: Resolution,
        _auxiliary: &AuxiliaryChannels,
    ) -> Result<ChannelColumns, ReconstructionError> {
        let factor = target.subdivisions_of(coarse.resolution())?;
        let mut columns = ChannelColumns::new();
        for channel in Channel::IRRADIANCE {
            let column = coarse
                .column(channel)
                .into_iter()
                .flat_map(|value| std::iter::repeat_n(value, factor))
                .collect();
            columns.insert(channel, column);
        }
        Ok(columns)
    }
}

/// Shapes each coarse interval by the clear-sky profile inside it.
///
/// A coarse mean `v` becomes `v * w_j / mean(w)` for clear-sky weights `w_j`
/// of its sub-intervals: the clear-sky index is held constant across the
/// interval. Intervals whose clear-sky mean is below `min_clear_sky_w_m2`
/// start from a flat profile instead.
///
/// Each sub-interval is then capped at `max_clear_sky_index * w_j +
/// twilight_w_m2`. Whatever the caps remove is handed to the sub-intervals
/// with headroom left, in proportion to that headroom, so the coarse mean is
/// kept. If the caps cannot hold the coarse mean at all, every sub-interval
/// is filled to its cap and the remainder is spread evenly.
///
/// The profile is computed once per interval, from global horizontal for the
/// horizontal and beam channels and from direct normal for DNI, and applied
/// to every channel sharing those weights. Direct and diffuse horizontal
/// therefore keep summing to global.
#[derive(Debug, Clone, Copy)]
pub struct ClearSkyIndexReconstructor {
    min_clear_sky_w_m2: f64,
    max_clear_sky_index: f64,
    twilight_w_m2: f64,
}

impl Default for ClearSkyIndexReconstructor {
    fn default() -> Self {
        Self {
            min_clear_sky_w_m2: 1.0,
            max_clear_sky_index: 1.25,
            twilight_w_m2: 5.0,
        }
    }
}

impl ClearSkyIndexReconstructor {
    pub fn new(min_clear_sky_w_m2: f64) -> Self {
        Self {
            min_clear_sky_w_m2,
            ..Self::default()
        }
    }

    /// Bound each sub-interval to `max_index * clear_sky + twilight_w_m2`
    pub fn with_caps(mut self, max_index: f64, twilight_w_m2: f64) -> Self {
        self.max_clear_sky_index = max_index;
        self.twilight_w_m2 = twilight_w_m2;
        self
    }

    /// Multipliers of the coarse mean `value` for one interval; they average to one.
    fn profile(&self, value: f64, weights: &[f64]) -> Vec<f64> {
        let n = weights.len() as f64;
        if value <= 0.0 {
            return vec![1.0; weights.len()];
        }

        let mean_weight = weights.iter().sum::<f64>() / n;
        let mut fine: Vec<f64> = if mean_weight >= self.min_clear_sky_w_m2 {
            weights.iter().map(|w| value * w / mean_weight).collect()
        } else {
            vec![value; weights.len()]
        };
        let caps: Vec<f64> = weights
            .iter()
            .map(|w| self.max_clear_sky_index * w + self.twilight_w_m2)
            .collect();

        let cap_total: f64 = caps.iter().sum();
        if cap_total <= value * n {
            let overflow = value - cap_total / n;
            return caps.iter().map(|cap| (cap + overflow) / value).collect();
        }

        let mut excess = 0.0;
        for (v, cap) in fine.iter_mut().zip(&caps) {
            if *v > *cap {
                excess += *v - cap;
                *v = *cap;
            }
        }
        if excess > 0.0 {
            let headroom: f64 = fine.iter().zip(&caps).map(|(v, cap)| cap - v).sum();
            for (v, cap) in fine.iter_mut().zip(&caps) {
                *v += excess * (cap - *v) / headroom;
            }
        }

        fine.into_iter().map(|v| v / value).collect()
    }

    /// Apply per-interval profiles built from `driver` to every column in `channels`.
    fn shape(
        &self,
        coarse: &Series,
        driver: Channel,
        channels: &[Channel],
        weights: &[f64],
        factor: usize,
        columns: &mut ChannelColumns,
    ) {
        let driver_values = coarse.column(driver);
        let sources: Vec<Column> = channels.iter().map(|&channel| coarse.column(channel)).collect();
        let mut outputs: Vec<Column> = channels
            .iter()
            .map(|_| Vec::with_capacity(driver_values.len() * factor))
            .collect();

        for (index, block) in weights.chunks(factor).enumerate() {
            let profile = self.profile(driver_values[index].unwrap_or(0.0), block);
            for (source, output) in sources.iter().zip(outputs.iter_mut()) {
                let value = source[index];
                output.extend(profile.iter().map(|share| value.map(|v| v * share)));
            }
        }

        for (&channel, output) in channels.iter().zip(outputs) {
            columns.insert(channel, output);
        }
    }
}

impl ReconstructionStrategy for ClearSkyIndexReconstructor {
    fn name(&self) -> &str {
        "clear-sky-index"
    }

    fn required_auxiliary(&self) -> &[AuxiliaryKind] {
        &[AuxiliaryKind::ClearSky]
    }

    fn reconstruct(
        &self,
        coarse: &Series,
        target: Resolution,
        auxiliary: &AuxiliaryChannels,
    ) -> Result<ChannelColumns, ReconstructionError> {
        let factor = target.subdivisions_of(coarse.resolution())?;
        let missing = || ReconstructionError::MissingAuxiliary {
            strategy: self.name().to_string(),
            input: AuxiliaryKind::ClearSky,
        };
        let ghi = auxiliary.clear_sky_ghi().ok_or_else(missing)?;
        let dni = auxiliary.clear_sky_dni().ok_or_else(missing)?;

        let mut columns = ChannelColumns::new();
        self.shape(
            coarse,
            Channel::GlobalHorizontalIrradiance,
            &[
                Channel::GlobalHorizontalIrradiance,
                Channel::DirectHorizontalIrradiance,
                Channel::DiffuseIrradiance,
                Channel::DirectIrradiance,
            ],
            ghi,
            factor,
            &mut columns,
        );
        self.shape(
            coarse,
            Channel::DirectNormalIrradiance,
            &[Channel::DirectNormalIrradiance],
            dni,
            factor,
            &mut columns,
        );
        Ok(columns)
    }
}

/// Reconstruct the irradiance channels of `coarse` at `target`.
///
/// The returned series carries only irradiance channels. Fails if the target
/// is not finer, a required auxiliary input is absent, the coarse series has
/// gaps in any irradiance channel, or the strategy output breaks closure.
pub fn reconstruct(
    coarse: &Series,
    target: Resolution,
    strategy: &dyn ReconstructionStrategy,
    auxiliary: &AuxiliaryChannels,
    tolerance: &Tolerance,
) -> Result<Series, ReconstructionError> {
    let coarse_resolution = coarse.resolution();
    if target >= coarse_resolution {
        return Err(ReconstructionError::NotFiner {
            coarse: coarse_resolution.seconds(),
            target: target.seconds(),
        });
    }
    let factor = target.subdivisions_of(coarse_resolution)?;

    for &kind in strategy.required_auxiliary() {
        if !auxiliary.provides(kind) {
            return Err(ReconstructionError::MissingAuxiliary {
                strategy: strategy.name().to_string(),
                input: kind,
            });
        }
    }

    for channel in Channel::IRRADIANCE {
        if let Some(gap) = coarse.iter().find(|observation| observation.get(channel).is_none()) {
            return Err(ReconstructionError::CoarseGap {
                channel,
                timestamp: gap.timestamp.to_rfc3339(),
            });
        }
    }

    debug!(
        "Reconstructing irradiance {} -> {} with '{}'",
        coarse_resolution,
        target,
        strategy.name()
    );
    let fine = strategy.reconstruct(coarse, target, auxiliary)?;

    let expected_len = coarse.len() * factor;
    for channel in Channel::IRRADIANCE {
        let column = fine.get(channel).ok_or(ReconstructionError::ShapeMismatch {
            channel,
            expected: expected_len,
            found: 0,
        })?;
        if column.len() != expected_len {
            return Err(ReconstructionError::ShapeMismatch {
                channel,
                expected: expected_len,
                found: column.len(),
            });
        }
        verify_closure(coarse, channel, column, factor, tolerance)?;
    }

    let calendar = coarse.calendar().with_resolution(target);
    Ok(Series::from_columns(
        calendar,
        coarse.region().cloned(),
        &fine,
    )?)
}

fn verify_closure(
    coarse: &Series,
    channel: Channel,
    fine: &[Option<f64>],
    factor: usize,
    tolerance: &Tolerance,
) -> Result<(), ReconstructionError> {
    let recovered = downsample_column(fine, factor);
    for (observation, recovered) in coarse.iter().zip(recovered) {
        let Some(expected) = observation.get(channel) else {
            continue;
        };
        let closes = recovered.is_some_and(|actual| tolerance.allows(expected, actual));
        if !closes {
            return Err(ReconstructionError::ClosureViolation {
                channel,
                timestamp: observation.timestamp.to_rfc3339(),
                coarse: expected,
                reconstructed: recovered.unwrap_or(f64::NAN),
            });
        }
    }
    Ok(())
}
