//! Interval-mean resampling for slowly varying channels.
//!
//! Values are means over their interval, so upsampling anchors each input
//! value at its interval midpoint, builds the piecewise-linear interpolant
//! through those midpoints and integrates it exactly over every output
//! sub-interval. Downsampling is the length-weighted mean of the covered
//! inputs. Wind direction is handled on the unit circle.
//!
//! With mean preservation on, each interval's sub-values are shifted so they
//! average back to the input. The shift respects the channel's valid range:
//! wind speed never goes negative and albedo stays within `[0, 1]`.
//!
//! Missing values propagate: an output interval overlapping a missing input
//! interval is missing. A missing neighbour only flattens the interpolant on
//! its side of the midpoint.

use crate::calendar::Resolution;
use crate::error::CalendarError;
use crate::models::{Channel, ChannelColumns, Column, Series};
use tracing::debug;

/// Below this resultant length a set of directions has no defined mean.
const MIN_RESULTANT: f64 = 1e-9;

/// Normalize an angle into `[0, 360)`, snapping values within 1e-9 of north to 0
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped < 1e-9 || wrapped >= 360.0 - 1e-9 {
        0.0
    } else {
        wrapped
    }
}

/// Mean direction of a set of angles in degrees, or `None` when they cancel out.
pub fn circular_mean(angles: &[f64]) -> Option<f64> {
    if angles.is_empty() {
        return None;
    }
    let (sin_sum, cos_sum) = angles.iter().fold((0.0, 0.0), |(s, c), angle| {
        let radians = angle.to_radians();
        (s + radians.sin(), c + radians.cos())
    });
    let n = angles.len() as f64;
    if (sin_sum / n).hypot(cos_sum / n) < MIN_RESULTANT {
        return None;
    }
    Some(normalize_degrees(sin_sum.atan2(cos_sum).to_degrees()))
}

/// Length-weighted block means; `factor` inputs per output.
pub fn downsample_column(values: &[Option<f64>], factor: usize) -> Column {
    values
        .chunks(factor)
        .map(|block| {
            let sum: Option<f64> = block.iter().copied().sum();
            sum.map(|total| total / block.len() as f64)
        })
        .collect()
}

/// Block means of directions on the unit circle.
pub fn downsample_circular(values: &[Option<f64>], factor: usize) -> Column {
    values
        .chunks(factor)
        .map(|block| {
            let angles: Option<Vec<f64>> = block.iter().copied().collect();
            angles.and_then(|angles| circular_mean(&angles))
        })
        .collect()
}

/// Split every input interval into `factor` sub-intervals whose values are
/// exact means of the midpoint-anchored linear interpolant.
pub fn upsample_column(values: &[Option<f64>], factor: usize, preserve_means: bool) -> Column {
    upsample_within(values, factor, preserve_means, (f64::NEG_INFINITY, f64::INFINITY))
}

/// Like [`upsample_column`], but the mean-preserving shift never pushes a
/// sub-interval outside `range`. Sub-intervals that would cross a bound are
/// held at it and the others move further, so each interval keeps its mean.
pub fn upsample_within(
    values: &[Option<f64>],
    factor: usize,
    preserve_means: bool,
    range: (f64, f64),
) -> Column {
    let mut output = Vec::with_capacity(values.len() * factor);

    for (i, value) in values.iter().enumerate() {
        let Some(centre) = *value else {
            output.extend(std::iter::repeat_n(None, factor));
            continue;
        };
        let left = i.checked_sub(1).and_then(|j| values[j]);
        let right = values.get(i + 1).copied().flatten();

        let mut block = subinterval_means(left, centre, right, factor);
        if preserve_means {
            shift_to_mean(&mut block, centre, range);
        }
        output.extend(block.into_iter().map(Some));
    }

    output
}

/// Shift `block` so it averages to `target`, clamping values into `range`.
///
/// The clamped mean is piecewise linear and non-decreasing in the shift, with
/// kinks where a value meets a bound, so the exact shift is found by linear
/// interpolation between the kinks bracketing `target`.
fn shift_to_mean(block: &mut [f64], target: f64, (lower, upper): (f64, f64)) {
    let n = block.len() as f64;
    let uniform = target - block.iter().sum::<f64>() / n;
    let in_range = |v: f64| (lower..=upper).contains(&v);

    if !in_range(target) || block.iter().all(|&v| in_range(v + uniform)) {
        block.iter_mut().for_each(|v| *v += uniform);
        return;
    }

    let mean_at = |shift: f64| block.iter().map(|v| (v + shift).clamp(lower, upper)).sum::<f64>() / n;
    let mut kinks: Vec<f64> = block
        .iter()
        .flat_map(|v| [lower - v, upper - v])
        .filter(|kink| kink.is_finite())
        .collect();
    kinks.sort_by(f64::total_cmp);

    let mut previous: Option<(f64, f64)> = None;
    let mut shift = None;
    for &kink in &kinks {
        let mean = mean_at(kink);
        if mean >= target {
            shift = Some(match previous {
                Some((s0, m0)) if mean > m0 => s0 + (kink - s0) * (target - m0) / (mean - m0),
                // Slope is one below the first kink
                _ => kink - (mean - target),
            });
            break;
        }
        previous = Some((kink, mean));
    }
    // Past the last kink nothing sits at the upper bound, so the slope is one
    let shift = shift.or_else(|| previous.map(|(s0, m0)| s0 + (target - m0))).unwrap_or(uniform);

    block
        .iter_mut()
        .for_each(|v| *v = (*v + shift).clamp(lower, upper));
}

/// Upsample directions by interpolating their unit-vector components.
pub fn upsample_circular(values: &[Option<f64>], factor: usize, preserve_means: bool) -> Column {
    let sines: Column = values.iter().map(|v| v.map(|d| d.to_radians().sin())).collect();
    let cosines: Column = values.iter().map(|v| v.map(|d| d.to_radians().cos())).collect();

    let sines = upsample_column(&sines, factor, preserve_means);
    let cosines = upsample_column(&cosines, factor, preserve_means);

    sines
        .into_iter()
        .zip(cosines)
        .enumerate()
        .map(|(i, (s, c))| direction_from_components(s?, c?, values[i / factor]))
        .collect()
}

/// Direction of a `(sin, cos)` pair. Components that cancel out fall back to
/// the direction of the source interval.
fn direction_from_components(sin: f64, cos: f64, source: Option<f64>) -> Option<f64> {
    if sin.hypot(cos) < MIN_RESULTANT {
        return source.map(normalize_degrees);
    }
    Some(normalize_degrees(sin.atan2(cos).to_degrees()))
}

/// Means of the interpolant over `factor` equal parts of one interval, in
/// interval-local coordinates where the midpoint sits at 0.5 and the
/// neighbouring midpoints at -0.5 and 1.5.
fn subinterval_means(left: Option<f64>, centre: f64, right: Option<f64>, factor: usize) -> Vec<f64> {
    let left_line = |x: f64| left.map_or(centre, |l| centre + (centre - l) * (x - 0.5));
    let right_line = |x: f64| right.map_or(centre, |r| centre + (r - centre) * (x - 0.5));
    let width = 1.0 / factor as f64;

    (0..factor)
        .map(|k| {
            let a = k as f64 * width;
            let b = (k + 1) as f64 * width;
            let mut integral = 0.0;

            // Each half is linear, so its integral is length times midpoint value
            let (la, lb) = (a.min(0.5), b.min(0.5));
            if lb > la {
                integral += (lb - la) * left_line((la + lb) / 2.0);
            }
            let (ra, rb) = (a.max(0.5), b.max(0.5));
            if rb > ra {
                integral += (rb - ra) * right_line((ra + rb) / 2.0);
            }

            integral / width
        })
        .collect()
}

/// Resample one channel column between resolutions.
pub fn resample_column(
    channel: Channel,
    values: &[Option<f64>],
    from: Resolution,
    to: Resolution,
    preserve_means: bool,
) -> Result<Column, CalendarError> {
    if from == to {
        return Ok(values.to_vec());
    }

    if to > from {
        let factor = from.subdivisions_of(to)?;
        Ok(if channel.is_circular() {
            downsample_circular(values, factor)
        } else {
            downsample_column(values, factor)
        })
    } else {
        let factor = to.subdivisions_of(from)?;
        Ok(if channel.is_circular() {
            upsample_circular(values, factor, preserve_means)
        } else {
            upsample_within(values, factor, preserve_means, channel.valid_range())
        })
    }
}

/// Resamples the slow channels of a series.
#[derive(Debug, Clone, Copy)]
pub struct IntervalResampler {
    preserve_means: bool,
}

impl Default for IntervalResampler {
    fn default() -> Self {
        Self::new(true)
    }
}

impl IntervalResampler {
    pub fn new(preserve_means: bool) -> Self {
        Self { preserve_means }
    }

    /// Slow-channel columns of `series` at `target`.
    pub fn resample(&self, series: &Series, target: Resolution) -> Result<ChannelColumns, CalendarError> {
        let from = series.resolution();
        debug!("Resampling slow channels {} -> {}", from, target);

        let mut columns = ChannelColumns::new();
        for channel in Channel::SLOW {
            let column = resample_column(
                channel,
                &series.column(channel),
                from,
                target,
                self.preserve_means,
            )?;
            columns.insert(channel, column);
        }
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Calendar, LeapDayPolicy, TimezoneRule};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn hour_between_10_and_14_splits_into_quarter_hours() {
        let hourly = vec![Some(10.0), Some(12.0), Some(14.0)];
        let quarters = upsample_column(&hourly, 4, false);

        assert_eq!(
            quarters[4..8].to_vec(),
            vec![Some(11.25), Some(11.75), Some(12.25), Some(12.75)]
        );
        let recovered = downsample_column(&quarters[4..8], 4);
        assert_eq!(recovered, vec![Some(12.0)]);
    }

    #[test]
    fn mean_preservation_restores_peaks() {
        let hourly = vec![Some(10.0), Some(20.0), Some(10.0)];
        let plain = upsample_column(&hourly, 4, false);
        let preserved = upsample_column(&hourly, 4, true);

        let plain_mean = downsample_column(&plain[4..8], 4)[0].unwrap();
        assert!(plain_mean < 20.0);
        let preserved_means = downsample_column(&preserved, 4);
        for (original, recovered) in hourly.iter().zip(&preserved_means) {
            assert!(approx(original.unwrap(), recovered.unwrap()));
        }
    }

    #[test]
    fn odd_ratio_integrates_across_midpoint() {
        // 15 one-minute parts of a quarter hour put the midpoint inside part 7
        let values = vec![Some(0.0), Some(15.0), Some(30.0)];
        let minutes = upsample_column(&values, 15, false);
        let middle = minutes[15 + 7].unwrap();
        assert!(approx(middle, 15.0));
        assert!(approx(downsample_column(&minutes[15..30], 15)[0].unwrap(), 15.0));
    }

    #[test]
    fn edges_are_held_flat() {
        let values = vec![Some(5.0), Some(7.0)];
        let parts = upsample_column(&values, 2, false);
        assert_eq!(parts[0], Some(5.0));
        assert_eq!(parts[3], Some(7.0));
    }

    #[test]
    fn missing_inputs_propagate() {
        let values = vec![Some(1.0), None, Some(3.0), Some(4.0)];
        let up = upsample_column(&values, 4, true);
        assert!(up[4..8].iter().all(Option::is_none));
        assert!(up[0..4].iter().all(Option::is_some));
        assert!(up[8..12].iter().all(Option::is_some));

        let down = downsample_column(&values, 2);
        assert_eq!(down, vec![None, Some(3.5)]);
    }

    #[test]
    fn circular_mean_wraps_through_north() {
        assert_eq!(circular_mean(&[350.0, 10.0]), Some(0.0));
        assert!(approx(circular_mean(&[80.0, 100.0]).unwrap(), 90.0));
        assert_eq!(circular_mean(&[0.0, 180.0]), None);
        assert_eq!(circular_mean(&[]), None);
    }

    #[test]
    fn circular_downsampling_never_averages_to_south() {
        let directions = vec![Some(350.0), Some(10.0), Some(340.0), None];
        let down = downsample_circular(&directions, 2);
        assert_eq!(down[0], Some(0.0));
        assert_eq!(down[1], None);
    }

    #[test]
    fn circular_upsampling_crosses_north_the_short_way() {
        let directions = vec![Some(350.0), Some(10.0)];
        let up = upsample_circular(&directions, 4, true);
        for value in up.iter().flatten() {
            assert!(*value >= 340.0 || *value <= 20.0, "went the long way: {value}");
        }
        let back = downsample_circular(&up, 4);
        assert!((back[0].unwrap() - 350.0).abs() < 0.5);
        assert!((back[1].unwrap() - 10.0).abs() < 0.5);
    }

    #[test]
    fn calm_then_windy_hours_never_go_negative() {
        let hourly = vec![Some(0.0), Some(10.0), Some(0.0)];
        let quarters = resample_column(
            Channel::WindSpeed,
            &hourly,
            Resolution::HOUR,
            Resolution::QUARTER_HOUR,
            true,
        )
        .unwrap();

        for value in quarters.iter().flatten() {
            assert!(*value >= 0.0, "negative wind speed {value}");
        }
        for (original, recovered) in hourly.iter().zip(downsample_column(&quarters, 4)) {
            assert!(approx(original.unwrap(), recovered.unwrap()));
        }
        // The windy hour keeps its peak shape
        assert!(quarters[5].unwrap() > quarters[4].unwrap());
        assert!(quarters[5].unwrap() > 10.0);

        // The unbounded shift is what dips below zero
        let unbounded = upsample_column(&hourly, 4, true);
        assert!(unbounded[0].unwrap() < 0.0);
    }

    #[test]
    fn albedo_step_stays_within_unit_range() {
        let hourly = vec![Some(0.95), Some(0.2)];
        let quarters = resample_column(
            Channel::SurfaceAlbedo,
            &hourly,
            Resolution::HOUR,
            Resolution::QUARTER_HOUR,
            true,
        )
        .unwrap();

        for value in quarters.iter().flatten() {
            assert!((0.0..=1.0).contains(value), "albedo {value} outside [0, 1]");
        }
        for (original, recovered) in hourly.iter().zip(downsample_column(&quarters, 4)) {
            assert!(approx(original.unwrap(), recovered.unwrap()));
        }
        assert_eq!(quarters[0], Some(1.0));
        assert!(quarters[3].unwrap() < 0.95);

        let unbounded = upsample_column(&hourly, 4, true);
        assert!(unbounded[0].unwrap() > 1.0);
    }

    #[test]
    fn shift_lands_on_bound_when_mean_sits_there() {
        let mut block = vec![0.0, 0.0, 1.25, 3.75];
        shift_to_mean(&mut block, 0.0, (0.0, f64::INFINITY));
        assert_eq!(block, vec![0.0; 4]);

        // Out-of-range targets keep the plain shift
        let mut block = vec![1.0, 1.5];
        shift_to_mean(&mut block, 1.5, (0.0, 1.0));
        assert!(approx(block[0], 1.25));
        assert!(approx(block[1], 1.75));
    }

    #[test]
    fn cancelled_components_fall_back_to_source_direction() {
        assert_eq!(direction_from_components(0.0, 0.0, Some(270.0)), Some(270.0));
        assert_eq!(direction_from_components(1e-12, -1e-12, Some(360.0)), Some(0.0));
        assert_eq!(direction_from_components(0.0, 0.0, None), None);
        assert!(approx(direction_from_components(1.0, 0.0, Some(0.0)).unwrap(), 90.0));
    }

    #[test]
    fn resampler_counts_match_calendar() {
        let calendar = Calendar::new(
            2023,
            Resolution::HOUR,
            TimezoneRule::CentralEuropean,
            LeapDayPolicy::Drop,
        )
        .unwrap();
        let mut columns = ChannelColumns::new();
        for channel in Channel::SLOW {
            columns.insert(channel, vec![Some(1.0); calendar.len()]);
        }
        let series = Series::from_columns(calendar, None, &columns).unwrap();
        let resampler = IntervalResampler::default();

        for (target, expected) in [
            (Resolution::MINUTE, 525_600),
            (Resolution::QUARTER_HOUR, 35_040),
            (Resolution::HOUR, 8_760),
        ] {
            let out = resampler.resample(&series, target).unwrap();
            for channel in Channel::SLOW {
                assert_eq!(out.get(channel).unwrap().len(), expected);
            }
            assert_eq!(calendar.with_resolution(target).len(), expected);
        }
    }

    #[test]
    fn incommensurate_resolutions_are_rejected() {
        let err = resample_column(
            Channel::Temperature,
            &[Some(1.0)],
            Resolution::new(720).unwrap(),
            Resolution::new(450).unwrap(),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, CalendarError::IncommensurateResolutions { .. }));
    }
}
