//! Solar geometry and clear-sky irradiance.
//!
//! Spencer (1971) series for declination, equation of time and orbital
//! eccentricity; Haurwitz clear-sky global irradiance; Meinel clear-sky
//! beam irradiance with Kasten-Young air mass. Accurate to well within the
//! needs of interval-mean shaping and plausibility bounds.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use std::f64::consts::PI;

/// Solar constant, W/m²
pub const SOLAR_CONSTANT: f64 = 1361.0;

const DEG: f64 = PI / 180.0;

/// Longest spacing between samples when averaging over an interval.
const SAMPLE_SPACING_SECONDS: u32 = 300;

/// Fractional day of year (1-based) plus UTC decimal hour.
fn day_and_hour(instant: DateTime<Utc>) -> (f64, f64) {
    let hour = instant.hour() as f64
        + instant.minute() as f64 / 60.0
        + instant.second() as f64 / 3600.0;
    (instant.ordinal() as f64, hour)
}

fn day_angle(doy: f64) -> f64 {
    2.0 * PI * (doy - 1.0) / 365.0
}

/// Solar declination in radians
pub fn declination(doy: f64) -> f64 {
    let b = day_angle(doy);
    0.006918 - 0.399912 * b.cos() + 0.070257 * b.sin() - 0.006758 * (2.0 * b).cos()
        + 0.000907 * (2.0 * b).sin()
        - 0.002697 * (3.0 * b).cos()
        + 0.00148 * (3.0 * b).sin()
}

/// Equation of time in minutes
pub fn equation_of_time(doy: f64) -> f64 {
    let b = day_angle(doy);
    229.18
        * (0.000075 + 0.001868 * b.cos()
            - 0.032077 * b.sin()
            - 0.014615 * (2.0 * b).cos()
            - 0.04089 * (2.0 * b).sin())
}

/// Extraterrestrial irradiance on a surface normal to the sun, W/m²
pub fn extraterrestrial_normal(doy: f64) -> f64 {
    let b = day_angle(doy);
    SOLAR_CONSTANT
        * (1.000110 + 0.034221 * b.cos() + 0.001280 * b.sin() + 0.000719 * (2.0 * b).cos()
            + 0.000077 * (2.0 * b).sin())
}

/// Cosine of the solar zenith angle; negative when the sun is below the horizon.
pub fn cos_zenith(instant: DateTime<Utc>, latitude: f64, longitude: f64) -> f64 {
    let (doy, utc_hour) = day_and_hour(instant);
    let decl = declination(doy);
    let solar_time = utc_hour + longitude / 15.0 + equation_of_time(doy) / 60.0;
    let hour_angle = 15.0 * (solar_time - 12.0) * DEG;
    let lat = latitude * DEG;
    lat.sin() * decl.sin() + lat.cos() * decl.cos() * hour_angle.cos()
}

/// Haurwitz clear-sky global horizontal irradiance, W/m²
pub fn clear_sky_ghi(cos_zenith: f64) -> f64 {
    if cos_zenith <= 0.0 {
        return 0.0;
    }
    1098.0 * cos_zenith * (-0.057 / cos_zenith).exp()
}

/// Meinel clear-sky direct normal irradiance, W/m²
pub fn clear_sky_dni(cos_zenith: f64, doy: f64) -> f64 {
    if cos_zenith <= 0.0 {
        return 0.0;
    }
    let zenith_deg = cos_zenith.clamp(-1.0, 1.0).acos() / DEG;
    let air_mass = 1.0 / (cos_zenith + 0.50572 * (96.07995 - zenith_deg).powf(-1.6364));
    extraterrestrial_normal(doy) * 0.7_f64.powf(air_mass.powf(0.678))
}

/// Interval-mean solar quantities over `[start, start + seconds)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IntervalSun {
    /// Mean of the positive part of cos zenith
    pub mean_cos_zenith: f64,
    /// Largest cos zenith sampled in the interval, clamped at zero
    pub max_cos_zenith: f64,
    pub clear_sky_ghi: f64,
    pub clear_sky_dni: f64,
    pub extraterrestrial_normal: f64,
}

/// Average solar geometry and clear-sky irradiance over an interval using
/// midpoint sampling; the interval end also counts toward the maximum.
pub fn interval_sun(start: DateTime<Utc>, seconds: u32, latitude: f64, longitude: f64) -> IntervalSun {
    let samples = seconds.div_ceil(SAMPLE_SPACING_SECONDS).max(1);
    let step = seconds as f64 / samples as f64;

    let mut sum = IntervalSun::default();
    let mut max_cos = cos_zenith(start, latitude, longitude)
        .max(cos_zenith(start + Duration::seconds(i64::from(seconds)), latitude, longitude))
        .max(0.0);

    for k in 0..samples {
        let offset = (k as f64 + 0.5) * step;
        let instant = start + Duration::milliseconds((offset * 1000.0) as i64);
        let (doy, _) = day_and_hour(instant);
        let cos_z = cos_zenith(instant, latitude, longitude);
        max_cos = max_cos.max(cos_z);
        sum.mean_cos_zenith += cos_z.max(0.0);
        sum.clear_sky_ghi += clear_sky_ghi(cos_z);
        sum.clear_sky_dni += clear_sky_dni(cos_z, doy);
        sum.extraterrestrial_normal += extraterrestrial_normal(doy);
    }

    let n = samples as f64;
    IntervalSun {
        mean_cos_zenith: sum.mean_cos_zenith / n,
        max_cos_zenith: max_cos,
        clear_sky_ghi: sum.clear_sky_ghi / n,
        clear_sky_dni: sum.clear_sky_dni / n,
        extraterrestrial_normal: sum.extraterrestrial_normal / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn extraterrestrial_varies_with_orbit() {
        let january = extraterrestrial_normal(3.0);
        let july = extraterrestrial_normal(185.0);
        assert!(january > 1400.0 && january < 1420.0);
        assert!(july > 1310.0 && july < 1330.0);
    }

    #[test]
    fn sun_is_up_at_summer_noon_and_down_at_midnight() {
        // Berlin
        let noon = cos_zenith(utc("2023-06-21T11:00:00Z"), 52.5, 13.4);
        let midnight = cos_zenith(utc("2023-06-21T23:00:00Z"), 52.5, 13.4);
        // Max elevation ~61 degrees
        assert!(noon > 0.85 && noon < 0.9);
        assert!(midnight < 0.0);
    }

    #[test]
    fn clear_sky_is_zero_at_night_and_below_extraterrestrial() {
        assert_eq!(clear_sky_ghi(-0.2), 0.0);
        assert_eq!(clear_sky_dni(0.0, 100.0), 0.0);
        let ghi = clear_sky_ghi(0.9);
        let dni = clear_sky_dni(0.9, 172.0);
        assert!(ghi > 800.0 && ghi < extraterrestrial_normal(172.0) * 0.9);
        assert!(dni > 700.0 && dni < extraterrestrial_normal(172.0));
    }

    #[test]
    fn interval_sun_averages_within_bounds() {
        let sun = interval_sun(utc("2023-06-21T10:00:00Z"), 3600, 52.5, 13.4);
        assert!(sun.mean_cos_zenith > 0.0);
        assert!(sun.max_cos_zenith >= sun.mean_cos_zenith);
        assert!(sun.clear_sky_ghi <= sun.extraterrestrial_normal * sun.max_cos_zenith);

        let night = interval_sun(utc("2023-12-21T22:00:00Z"), 900, 52.5, 13.4);
        assert_eq!(night.clear_sky_ghi, 0.0);
        assert_eq!(night.max_cos_zenith, 0.0);
    }
}
