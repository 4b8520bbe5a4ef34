//! Output writing for assembled series.
//!
//! A series becomes a polars `DataFrame` with the local timestamp as text,
//! UTC epoch seconds, and one nullable `f64` column per channel, then is
//! written as Parquet (Snappy) or CSV.

use crate::error::WriteError;
use crate::models::{Channel, Series};

use clap::ValueEnum;
use polars::prelude::{
    Column, CsvWriter, DataFrame, ParquetCompression, ParquetWriter, SerWriter,
};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Parquet,
    Csv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Parquet => "parquet",
            OutputFormat::Csv => "csv",
        }
    }
}

/// Columnar view of a series.
pub fn series_to_dataframe(series: &Series) -> Result<DataFrame, WriteError> {
    let timestamps: Vec<String> = series
        .iter()
        .map(|observation| observation.timestamp.to_rfc3339())
        .collect();
    let epoch_seconds: Vec<i64> = series
        .iter()
        .map(|observation| observation.timestamp.timestamp())
        .collect();

    let mut columns = Vec::with_capacity(Channel::ALL.len() + 2);
    columns.push(Column::new("timestamp".into(), timestamps));
    columns.push(Column::new("epoch_seconds".into(), epoch_seconds));
    for channel in Channel::ALL {
        columns.push(Column::new(channel.name().into(), series.column(channel)));
    }

    Ok(DataFrame::new(columns)?)
}

/// `<output_dir>/<source stem>_<resolution>.<ext>`
pub fn output_path_for(output_dir: &Path, source: &Path, series: &Series, format: OutputFormat) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "series".to_string());
    output_dir.join(format!(
        "{}_{}s.{}",
        stem,
        series.resolution().seconds(),
        format.extension()
    ))
}

/// Write `series` to `path`, creating parent directories. Returns rows written.
pub fn write_series(series: &Series, path: &Path, format: OutputFormat) -> Result<usize, WriteError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| WriteError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut df = series_to_dataframe(series)?;
    let file = File::create(path).map_err(|source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match format {
        OutputFormat::Parquet => {
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Snappy)
                .finish(&mut df)?;
        }
        OutputFormat::Csv => {
            CsvWriter::new(file).include_header(true).finish(&mut df)?;
        }
    }

    debug!("Wrote {} rows to {}", df.height(), path.display());
    Ok(df.height())
}
