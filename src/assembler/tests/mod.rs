//! Pipeline tests for the assembler
//!
//! Fixtures are full hourly region-years written to temporary files.

pub mod pipeline;

use crate::calendar::{Calendar, LeapDayPolicy, Resolution, TimezoneRule};
use crate::models::Region;
use crate::solar::interval_sun;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub fn berlin() -> Region {
    Region::new("DE-BE", "Berlin", 13.4, 52.5)
}

/// Fixture knobs
#[derive(Debug, Clone, Copy)]
pub struct YearFixture {
    pub albedo: f64,
    /// Write this hour's global horizontal as missing
    pub gap_at: Option<usize>,
    /// Repeat this hour's row at the end of the file
    pub duplicate: Option<usize>,
}

impl Default for YearFixture {
    fn default() -> Self {
        Self {
            albedo: 0.2,
            gap_at: None,
            duplicate: None,
        }
    }
}

/// Rows of a 2023 hourly year at 80% of clear sky over `region`
pub fn year_rows(region: &Region, fixture: YearFixture) -> String {
    let calendar = Calendar::new(
        2023,
        Resolution::HOUR,
        TimezoneRule::CentralEuropean,
        LeapDayPolicy::Drop,
    )
    .unwrap();

    let mut rows = Vec::with_capacity(calendar.len());
    for (index, timestamp) in calendar.iter().enumerate() {
        let sun = interval_sun(
            calendar.instant_at(index).unwrap(),
            3_600,
            region.latitude,
            region.longitude,
        );
        let global = 0.8 * sun.clear_sky_ghi;
        let direct_horizontal = 0.6 * global;
        let diffuse = global - direct_horizontal;
        let direct_normal = 0.8 * sun.clear_sky_dni;
        let temperature = 10.0 + 8.0 * (index as f64 / 8_760.0 * std::f64::consts::TAU).sin();
        let wind_direction = (index * 7 % 360) as f64;
        let wind_speed = 3.0 + (index % 5) as f64;

        let global = if fixture.gap_at == Some(index) {
            "NA".to_string()
        } else {
            format!("{global:.6}")
        };

        let mut row = String::new();
        write!(
            row,
            "{},{temperature:.4},1013.25,{wind_direction:.1},{wind_speed:.1},{},{direct_horizontal:.6},{diffuse:.6},{direct_horizontal:.6},{direct_normal:.6},{global}",
            timestamp.format("%Y-%m-%d %H:%M:%S%:z"),
            fixture.albedo,
        )
        .unwrap();
        rows.push(row);
    }

    if let Some(index) = fixture.duplicate {
        let repeated = rows[index].clone();
        rows.push(repeated);
    }

    let mut content = String::from("datetime,t,p,wd,ws,alb,dir,dif,dh,dn,gh\n");
    for row in rows {
        content.push_str(&row);
        content.push('\n');
    }
    content
}

pub fn write_year(dir: &Path, name: &str, fixture: YearFixture) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, year_rows(&berlin(), fixture)).unwrap();
    path
}
