//! Region file parsing into calendar-aligned series.
//!
//! Reads the fixed 11-column layout (timestamp with embedded UTC offset plus
//! ten channel values), infers the native resolution from the modal gap
//! between consecutive rows and places every row on its calendar slot. Rows
//! that do not fit the inferred grid are collected as [`BoundaryAnomaly`]
//! records instead of being dropped silently; slots no row covers stay
//! absent.

use crate::calendar::{Calendar, LeapDayPolicy, Resolution, SlotLookup, TimezoneRule};
use crate::error::LoadError;
use crate::models::{CHANNEL_COUNT, ChannelValues, Observation, Series};
use chrono::{DateTime, Datelike, FixedOffset, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::task;
use tracing::{debug, warn};

/// Tokens read as an absent value.
pub const MISSING_MARKERS: &[&str] = &[
    "", "NA", "NaN", "nan", "null", "-999", "-999.0", "-9999", "-9999.0",
];

/// `yyyy-MM-dd hh:mm[:ss]` followed by `+HH`, `+HHMM` or `+HH:MM`.
static TIMESTAMP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2})[ T](\d{2}:\d{2})(?::(\d{2}))?\s*([+-]\d{2})(?::?(\d{2}))?$",
    )
    .expect("timestamp pattern is valid")
});

/// Field separators tried when none is configured.
const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

/// Options for reading a region file.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoadOptions {
    pub rule: TimezoneRule,
    pub leap_day: LeapDayPolicy,
    /// Calendar year of the series; inferred from the rows when absent
    pub year: Option<i32>,
    /// Field separator; detected from the first data line when absent
    pub delimiter: Option<u8>,
}

impl LoadOptions {
    pub fn new(rule: TimezoneRule) -> Self {
        Self {
            rule,
            ..Self::default()
        }
    }

    pub fn with_leap_day(mut self, leap_day: LeapDayPolicy) -> Self {
        self.leap_day = leap_day;
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }
}

/// Why a row did not land cleanly on the inferred grid.
#[derive(Debug, Clone, PartialEq)]
pub enum AnomalyKind {
    /// Gap to the previous row differs from the native resolution.
    IrregularGap {
        gap_seconds: i64,
        skipped_slots: usize,
    },
    /// Timestamp earlier than the previous row.
    OutOfOrder,
    /// Inside the year but between interval starts.
    OffGrid,
    /// Outside the series calendar year.
    OutsideYear,
    /// On a leap day the calendar drops.
    ExcludedLeapDay,
    /// Embedded offset disagrees with the timezone rule.
    OffsetMismatch { expected: FixedOffset },
}

/// A row flagged during loading, with its values retained.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryAnomaly {
    pub line: usize,
    pub timestamp: DateTime<FixedOffset>,
    pub kind: AnomalyKind,
    pub values: ChannelValues,
}

/// Result of loading one region file.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub series: Series,
    pub native_resolution: Resolution,
    pub anomalies: Vec<BoundaryAnomaly>,
    /// Data rows read from the file
    pub rows: usize,
    /// Calendar slots that no row covered
    pub uncovered_slots: usize,
    pub source: PathBuf,
}

impl Loaded {
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty() && self.uncovered_slots == 0
    }

    /// True when rows deviate from a single uniform step.
    pub fn is_mixed_resolution(&self) -> bool {
        self.anomalies.iter().any(|anomaly| {
            matches!(
                anomaly.kind,
                AnomalyKind::IrregularGap { .. } | AnomalyKind::OffGrid
            )
        })
    }
}

struct RawRow {
    line: usize,
    timestamp: DateTime<FixedOffset>,
    values: ChannelValues,
}

/// Load a region file under the given timezone rule
pub fn load_series(path: &Path, rule: TimezoneRule) -> Result<Loaded, LoadError> {
    load_series_with(path, LoadOptions::new(rule))
}

pub fn load_series_with(path: &Path, options: LoadOptions) -> Result<Loaded, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_rows(BufReader::new(file), path, options)
}

/// Load on the blocking pool, failing with [`LoadError::Timeout`] if the
/// read does not finish in time.
pub async fn load_series_with_timeout(
    path: PathBuf,
    options: LoadOptions,
    timeout: Duration,
) -> Result<Loaded, LoadError> {
    let handle = task::spawn_blocking({
        let path = path.clone();
        move || load_series_with(&path, options)
    });

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(LoadError::TaskFailed {
            path,
            reason: join_error.to_string(),
        }),
        Err(_) => Err(LoadError::Timeout { path, timeout }),
    }
}

/// Parse rows from any reader; `source` is used for error context.
pub fn parse_rows<R: Read>(
    mut reader: R,
    source: &Path,
    options: LoadOptions,
) -> Result<Loaded, LoadError> {
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .map_err(|e| LoadError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
    let delimiter = options
        .delimiter
        .unwrap_or_else(|| detect_delimiter(&content));

    let rows = read_raw_rows(&content, delimiter, source)?;
    if rows.len() < 2 {
        return Err(LoadError::InsufficientRows {
            path: source.to_path_buf(),
            rows: rows.len(),
        });
    }

    reject_duplicates(&rows, source)?;

    let step = modal_gap(&rows);
    let resolution = u32::try_from(step)
        .ok()
        .and_then(|seconds| Resolution::new(seconds).ok())
        .filter(|resolution| resolution.is_file_resolution())
        .ok_or_else(|| LoadError::UnsupportedResolution {
            path: source.to_path_buf(),
            seconds: step,
        })?;

    let year = options.year.unwrap_or_else(|| modal_year(&rows));
    let calendar = Calendar::new(year, resolution, options.rule, options.leap_day)?;

    debug!(
        "Parsed {} rows from {}: resolution={}, year={}",
        rows.len(),
        source.display(),
        resolution,
        year
    );

    let mut slots: Vec<Option<ChannelValues>> = vec![None; calendar.len()];
    let mut anomalies = Vec::new();
    let mut previous: Option<(DateTime<Utc>, Option<usize>)> = None;

    for row in &rows {
        let instant = row.timestamp.with_timezone(&Utc);
        let flag = |kind: AnomalyKind| BoundaryAnomaly {
            line: row.line,
            timestamp: row.timestamp,
            kind,
            values: row.values,
        };

        let expected_offset = options.rule.offset_at(instant);
        if *row.timestamp.offset() != expected_offset {
            anomalies.push(flag(AnomalyKind::OffsetMismatch {
                expected: expected_offset,
            }));
        }

        let lookup = calendar.index_of(instant);
        let slot = match lookup {
            SlotLookup::Slot(index) => Some(index),
            SlotLookup::OffGrid => {
                anomalies.push(flag(AnomalyKind::OffGrid));
                None
            }
            SlotLookup::ExcludedLeapDay => {
                anomalies.push(flag(AnomalyKind::ExcludedLeapDay));
                None
            }
            SlotLookup::OutOfRange => {
                anomalies.push(flag(AnomalyKind::OutsideYear));
                None
            }
        };

        if let Some((previous_instant, previous_slot)) = previous {
            let gap_seconds = (instant - previous_instant).num_seconds();
            if gap_seconds < 0 {
                anomalies.push(flag(AnomalyKind::OutOfOrder));
            } else if gap_seconds != step {
                // A gap spanning a dropped leap day is still contiguous on the calendar
                let contiguous = matches!((previous_slot, slot), (Some(a), Some(b)) if b == a + 1);
                if !contiguous {
                    let skipped_slots = match (previous_slot, slot) {
                        (Some(a), Some(b)) if b > a => b - a - 1,
                        _ => (gap_seconds / step).saturating_sub(1) as usize,
                    };
                    anomalies.push(flag(AnomalyKind::IrregularGap {
                        gap_seconds,
                        skipped_slots,
                    }));
                }
            }
        }

        if let Some(index) = slot {
            slots[index] = Some(row.values);
        }
        previous = Some((instant, slot));
    }

    let uncovered_slots = slots.iter().filter(|slot| slot.is_none()).count();
    let observations = calendar
        .iter()
        .zip(slots)
        .map(|(timestamp, values)| Observation {
            timestamp,
            values: values.unwrap_or([None; CHANNEL_COUNT]),
        })
        .collect();
    let series = Series::from_observations(calendar, None, observations)?;

    if !anomalies.is_empty() || uncovered_slots > 0 {
        warn!(
            "{}: {} boundary anomalies, {} uncovered slots",
            source.display(),
            anomalies.len(),
            uncovered_slots
        );
    }

    Ok(Loaded {
        series,
        native_resolution: resolution,
        anomalies,
        rows: rows.len(),
        uncovered_slots,
        source: source.to_path_buf(),
    })
}

fn read_raw_rows(content: &str, delimiter: u8, source: &Path) -> Result<Vec<RawRow>, LoadError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    let mut lines = LineCounter::new(content);

    while reader.read_record(&mut record).map_err(|e| LoadError::Csv {
        path: source.to_path_buf(),
        source: e,
    })? {
        let line_number = lines.line_before(reader.position().byte() as usize);
        if record.iter().all(str::is_empty) {
            continue;
        }

        let first = record.get(0).unwrap_or_default();
        let timestamp = match parse_timestamp(first) {
            Some(timestamp) => timestamp,
            // A column header may precede the data
            None if rows.is_empty() => {
                debug!("Skipping header line {} in {}", line_number, source.display());
                continue;
            }
            None => {
                return Err(LoadError::MalformedRow {
                    path: source.to_path_buf(),
                    line: line_number,
                    reason: format!("unparseable timestamp '{}'", first),
                });
            }
        };

        if record.len() != CHANNEL_COUNT + 1 {
            return Err(LoadError::MalformedRow {
                path: source.to_path_buf(),
                line: line_number,
                reason: format!(
                    "expected {} columns, found {}",
                    CHANNEL_COUNT + 1,
                    record.len()
                ),
            });
        }

        let mut values = [None; CHANNEL_COUNT];
        for (slot, field) in values.iter_mut().zip(record.iter().skip(1)) {
            *slot = parse_value(field).map_err(|reason| LoadError::MalformedRow {
                path: source.to_path_buf(),
                line: line_number,
                reason,
            })?;
        }

        rows.push(RawRow {
            line: line_number,
            timestamp,
            values,
        });
    }

    Ok(rows)
}

/// Line numbers of CSV records, located from the reader's byte offset after
/// each record so skipped comment lines are still counted.
pub(crate) struct LineCounter<'a> {
    bytes: &'a [u8],
    scanned: usize,
    newlines: usize,
}

impl<'a> LineCounter<'a> {
    pub(crate) fn new(content: &'a str) -> Self {
        Self {
            bytes: content.as_bytes(),
            scanned: 0,
            newlines: 0,
        }
    }

    /// 1-based line of the record that ends at byte `end`
    pub(crate) fn line_before(&mut self, end: usize) -> usize {
        let mut end = end.min(self.bytes.len());
        while end > self.scanned && matches!(self.bytes[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        if end > self.scanned {
            self.newlines += self.bytes[self.scanned..end]
                .iter()
                .filter(|byte| **byte == b'\n')
                .count();
            self.scanned = end;
        }
        self.newlines + 1
    }
}

/// Most frequent candidate separator on the first non-comment line
fn detect_delimiter(content: &str) -> u8 {
    let Some(line) = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
    else {
        return b',';
    };
    CANDIDATE_DELIMITERS
        .into_iter()
        .map(|delimiter| (delimiter, line.bytes().filter(|b| *b == delimiter).count()))
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map_or(b',', |(delimiter, _)| delimiter)
}

/// Parse a timestamp with its embedded offset
pub fn parse_timestamp(field: &str) -> Option<DateTime<FixedOffset>> {
    let captures = TIMESTAMP_PATTERN.captures(field.trim())?;
    let normalized = format!(
        "{} {}:{}{}:{}",
        &captures[1],
        &captures[2],
        captures.get(3).map_or("00", |m| m.as_str()),
        &captures[4],
        captures.get(5).map_or("00", |m| m.as_str()),
    );
    DateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%:z").ok()
}

fn parse_value(field: &str) -> Result<Option<f64>, String> {
    if MISSING_MARKERS.contains(&field) {
        return Ok(None);
    }
    let value: f64 = field
        .parse()
        .map_err(|_| format!("invalid numeric value '{}'", field))?;
    Ok(value.is_finite().then_some(value))
}

fn reject_duplicates(rows: &[RawRow], source: &Path) -> Result<(), LoadError> {
    let mut seen = HashSet::with_capacity(rows.len());
    for row in rows {
        if !seen.insert(row.timestamp.with_timezone(&Utc)) {
            return Err(LoadError::DuplicateTimestamp {
                path: source.to_path_buf(),
                line: row.line,
                timestamp: row.timestamp.to_rfc3339(),
            });
        }
    }
    Ok(())
}

/// Most frequent positive gap between consecutive rows; ties go to the
/// smaller gap. Returns 0 when no positive gap exists.
fn modal_gap(rows: &[RawRow]) -> i64 {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for pair in rows.windows(2) {
        let gap = (pair[1].timestamp - pair[0].timestamp).num_seconds();
        if gap > 0 {
            *counts.entry(gap).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|(gap_a, count_a), (gap_b, count_b)| count_a.cmp(count_b).then(gap_b.cmp(gap_a)))
        .map(|(gap, _)| gap)
        .unwrap_or(0)
}

fn modal_year(rows: &[RawRow]) -> i32 {
    let mut counts: HashMap<i32, usize> = HashMap::new();
    for row in rows {
        *counts.entry(row.timestamp.year()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(year_a, count_a), (year_b, count_b)| count_a.cmp(count_b).then(year_b.cmp(year_a)))
        .map(|(year, _)| year)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Channel;
    use std::io::Cursor;

    const VALUES: &str = "10.0,1013.0,180.0,3.0,0.2,0,0,0,0,0";

    fn parse(content: &str) -> Result<Loaded, LoadError> {
        parse_rows(
            Cursor::new(content.to_string()),
            Path::new("test.dat"),
            LoadOptions::default(),
        )
    }

    fn hourly_rows(count: usize) -> String {
        let calendar = Calendar::new(
            2023,
            Resolution::HOUR,
            TimezoneRule::CentralEuropean,
            LeapDayPolicy::Drop,
        )
        .unwrap();
        calendar
            .iter()
            .take(count)
            .map(|ts| format!("{},{}\n", ts.format("%Y-%m-%d %H:%M:%S%:z"), VALUES))
            .collect()
    }

    #[test]
    fn parses_offset_variants() {
        let expected = DateTime::parse_from_rfc3339("2023-01-01T00:00:00+01:00").unwrap();
        assert_eq!(parse_timestamp("2023-01-01 00:00:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01 00:00:00+0100"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01 00:00:00+01"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01T00:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01 00:00:00"), None);
        assert_eq!(parse_timestamp("datetime"), None);
    }

    #[test]
    fn infers_hourly_resolution_and_places_rows() {
        let loaded = parse(&format!("# TMY export\ndatetime,t,p,wd,ws,alb,dir,dif,dh,dn,gh\n{}", hourly_rows(48))).unwrap();

        assert_eq!(loaded.native_resolution, Resolution::HOUR);
        assert_eq!(loaded.rows, 48);
        assert_eq!(loaded.series.len(), 8_760);
        assert_eq!(loaded.uncovered_slots, 8_760 - 48);
        assert!(loaded.anomalies.is_empty());
        assert_eq!(loaded.series.get(47).unwrap().get(Channel::Temperature), Some(10.0));
        assert_eq!(loaded.series.get(48).unwrap().get(Channel::Temperature), None);
    }

    #[test]
    fn full_year_is_clean() {
        let loaded = parse(&hourly_rows(8_760)).unwrap();
        assert!(loaded.is_clean());
        assert!(!loaded.is_mixed_resolution());
        assert_eq!(loaded.series.year(), 2023);
    }

    #[test]
    fn missing_markers_stay_absent() {
        let content = "2023-01-01 00:00:00+01:00,NA,1013,-999,3,0.2,0,0,0,0,0\n\
                       2023-01-01 01:00:00+01:00,,1013,180,3,0.2,0,0,0,0,0\n\
                       2023-01-01 02:00:00+01:00,4.5,1013,180,3,0.2,0,0,0,0,0\n";
        let loaded = parse(content).unwrap();
        let first = loaded.series.get(0).unwrap();
        assert_eq!(first.get(Channel::Temperature), None);
        assert_eq!(first.get(Channel::WindDirection), None);
        assert_eq!(first.get(Channel::Pressure), Some(1013.0));
        assert_eq!(loaded.series.get(1).unwrap().get(Channel::Temperature), None);
        assert_eq!(loaded.series.get(2).unwrap().get(Channel::Temperature), Some(4.5));
    }

    #[test]
    fn duplicate_timestamp_is_fatal() {
        let mut content = hourly_rows(3);
        content.push_str(&format!("2023-01-01 01:00:00+01:00,{}\n", VALUES));
        let err = parse(&content).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateTimestamp { line: 4, .. }));
    }

    #[test]
    fn irregular_gaps_are_flagged_not_dropped() {
        let content = format!(
            "{}2023-01-01 06:00:00+01:00,{}\n2023-01-01 06:15:00+01:00,{}\n",
            hourly_rows(4),
            VALUES,
            VALUES
        );
        let loaded = parse(&content).unwrap();

        assert_eq!(loaded.native_resolution, Resolution::HOUR);
        assert!(loaded.is_mixed_resolution());
        let kinds: Vec<_> = loaded.anomalies.iter().map(|a| a.kind.clone()).collect();
        assert!(kinds.contains(&AnomalyKind::IrregularGap {
            gap_seconds: 10_800,
            skipped_slots: 2
        }));
        assert!(kinds.contains(&AnomalyKind::OffGrid));
        let off_grid = loaded
            .anomalies
            .iter()
            .find(|a| a.kind == AnomalyKind::OffGrid)
            .unwrap();
        assert_eq!(off_grid.values[Channel::Temperature.index()], Some(10.0));
    }

    #[test]
    fn wrong_offset_is_reported() {
        let content = "2023-07-01 12:00:00+01:00,1,1,1,1,0.2,0,0,0,0,0\n\
                       2023-07-01 13:00:00+01:00,1,1,1,1,0.2,0,0,0,0,0\n";
        let loaded = parse(content).unwrap();
        assert_eq!(
            loaded
                .anomalies
                .iter()
                .filter(|a| matches!(a.kind, AnomalyKind::OffsetMismatch { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn unsupported_resolution_is_rejected() {
        let content = "2023-01-01 00:00:00+01:00,1,1,1,1,0.2,0,0,0,0,0\n\
                       2023-01-01 00:30:00+01:00,1,1,1,1,0.2,0,0,0,0,0\n\
                       2023-01-01 01:00:00+01:00,1,1,1,1,0.2,0,0,0,0,0\n";
        let err = parse(content).unwrap_err();
        assert!(matches!(
            err,
            LoadError::UnsupportedResolution { seconds: 1_800, .. }
        ));
    }

    #[test]
    fn wrong_column_count_is_malformed() {
        let content = "2023-01-01 00:00:00+01:00,1,2,3\n";
        let err = parse(content).unwrap_err();
        assert!(matches!(err, LoadError::MalformedRow { line: 1, .. }));
    }

    #[test]
    fn semicolon_rows_with_quotes_and_comments() {
        let content = "# exported from the archive\n\
                       datetime;t;p;wd;ws;alb;dir;dif;dh;dn;gh\n\
                       \"2023-01-01 00:00:00+01:00\";10;1013;180;3;0.2;0;0;0;0;0\n\
                       # station maintenance\n\
                       2023-01-01 01:00:00+01:00; 11 ;1013;180;3;0.2;0;0;0;0;0\n\
                       2023-01-01 02:00:00+01:00;12;1013;\"\";3;0.2;0;0;0;0;0\n";
        let loaded = parse(content).unwrap();

        assert_eq!(loaded.native_resolution, Resolution::HOUR);
        assert_eq!(loaded.rows, 3);
        assert_eq!(loaded.series.get(1).unwrap().get(Channel::Temperature), Some(11.0));
        assert_eq!(loaded.series.get(2).unwrap().get(Channel::WindDirection), None);
    }

    #[test]
    fn malformed_row_reports_file_line() {
        let content = "# header comment\n\
                       2023-01-01 00:00:00+01:00;1;1;1;1;0.2;0;0;0;0;0\n\
                       # gap\n\
                       2023-01-01 01:00:00+01:00;1;1;1;1;0.2;0;0;0;0;0\n\
                       2023-01-01 02:00:00+01:00;1;2\n";
        let err = parse(content).unwrap_err();
        assert!(matches!(err, LoadError::MalformedRow { line: 5, .. }), "{err:?}");
    }

    #[test]
    fn configured_delimiter_is_used() {
        let content = "2023-01-01 00:00:00+01:00\t1\t1\t1\t1\t0.2\t0\t0\t0\t0\t0\n\
                       2023-01-01 01:00:00+01:00\t2\t1\t1\t1\t0.2\t0\t0\t0\t0\t0\n";
        let loaded = parse_rows(
            Cursor::new(content.to_string()),
            Path::new("tabs.dat"),
            LoadOptions::default().with_delimiter(b'\t'),
        )
        .unwrap();
        assert_eq!(loaded.series.get(1).unwrap().get(Channel::Temperature), Some(2.0));
        assert_eq!(detect_delimiter(content), b'\t');
        assert_eq!(detect_delimiter("# only\n2023-01-01 00:00:00+01:00,1;2,3\n"), b',');
    }

    #[test]
    fn single_row_cannot_infer_resolution() {
        let err = parse(&hourly_rows(1)).unwrap_err();
        assert!(matches!(err, LoadError::InsufficientRows { rows: 1, .. }));
    }

    #[test]
    fn dropped_leap_day_is_flagged() {
        let content = "2024-02-28 23:00:00+01:00,1,1,1,1,0.2,0,0,0,0,0\n\
                       2024-02-29 00:00:00+01:00,1,1,1,1,0.2,0,0,0,0,0\n\
                       2024-02-29 01:00:00+01:00,1,1,1,1,0.2,0,0,0,0,0\n";
        let loaded = parse(content).unwrap();
        assert_eq!(
            loaded
                .anomalies
                .iter()
                .filter(|a| a.kind == AnomalyKind::ExcludedLeapDay)
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn timeout_wrapper_loads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.dat");
        std::fs::write(&path, hourly_rows(24)).unwrap();

        let loaded = load_series_with_timeout(path, LoadOptions::default(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(loaded.rows, 24);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = load_series_with_timeout(
            PathBuf::from("/nonexistent/region.dat"),
            LoadOptions::default(),
            Duration::from_secs(10),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
