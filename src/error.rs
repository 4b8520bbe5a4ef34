//! Error handling for TMY ingestion and resampling.
//!
//! Each pipeline concern has its own error type. [`AssemblyError`] wraps the
//! first fatal cause raised by any stage of an assembly run.

use crate::assembler::PipelineState;
use crate::models::Channel;
use crate::reconstruct::AuxiliaryKind;
use crate::validate::ValidationReport;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Malformed or impossible date/resolution pairings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("resolution of {seconds}s does not evenly divide one hour")]
    InvalidResolution { seconds: u32 },

    #[error("resolutions {from}s and {to}s are not integer multiples of each other")]
    IncommensurateResolutions { from: u32, to: u32 },

    #[error("year {year} is outside the supported calendar range")]
    UnsupportedYear { year: i32 },

    #[error("invalid UTC offset of {seconds}s")]
    InvalidOffset { seconds: i32 },

    #[error("expected {expected} observations for the calendar, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("observation {index} has timestamp {found}, calendar expects {expected}")]
    TimestampMismatch {
        index: usize,
        expected: String,
        found: String,
    },
}

/// Failures while reading a region file into a [`crate::Series`].
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error reading {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed row at line {line} in {path}: {reason}")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("duplicate timestamp {timestamp} at line {line} in {path}")]
    DuplicateTimestamp {
        path: PathBuf,
        line: usize,
        timestamp: String,
    },

    #[error("not enough data rows in {path} to infer a resolution (found {rows})")]
    InsufficientRows { path: PathBuf, rows: usize },

    #[error("unsupported native resolution of {seconds}s in {path}")]
    UnsupportedResolution { path: PathBuf, seconds: i64 },

    #[error("loading {path} exceeded the {timeout:?} timeout")]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("load task for {path} failed: {reason}")]
    TaskFailed { path: PathBuf, reason: String },

    #[error("region catalog error in {path}: {reason}")]
    Catalog { path: PathBuf, reason: String },

    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

/// Failures of an irradiance reconstruction strategy or its closure check.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconstructionError {
    #[error("strategy '{strategy}' requires auxiliary input '{input}' which was not provided")]
    MissingAuxiliary {
        strategy: String,
        input: AuxiliaryKind,
    },

    #[error("coarse series has no {channel} value at {timestamp}")]
    CoarseGap { channel: Channel, timestamp: String },

    #[error("target resolution {target}s is not finer than the coarse resolution {coarse}s")]
    NotFiner { coarse: u32, target: u32 },

    #[error(
        "reconstructed {channel} does not close at {timestamp}: coarse {coarse}, reconstructed mean {reconstructed}"
    )]
    ClosureViolation {
        channel: Channel,
        timestamp: String,
        coarse: f64,
        reconstructed: f64,
    },

    #[error("strategy produced {found} values for {channel}, expected {expected}")]
    ShapeMismatch {
        channel: Channel,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

/// Physical-constraint violations, raised only in strict mode.
#[derive(Error, Debug, Clone)]
#[error("validation failed with {count} violations", count = .report.violations().len())]
pub struct ValidationFailure {
    pub report: ValidationReport,
}

/// Output writing failures.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

/// The first fatal cause of a failed assembly.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("load failed: {0}")]
    Load(#[from] LoadError),

    #[error("calendar error: {0}")]
    Calendar(#[from] CalendarError),

    #[error("reconstruction failed: {0}")]
    Reconstruction(#[from] ReconstructionError),

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error("assembly cancelled before entering {stage}")]
    Cancelled { stage: PipelineState },

    #[error("pipeline task failed during {stage}: {reason}")]
    TaskFailed { stage: PipelineState, reason: String },
}

impl AssemblyError {
    /// True when the run stopped because of a cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, AssemblyError>;

/// Failure of one file in a batch run.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("write failed: {0}")]
    Write(#[from] WriteError),

    #[error("write task failed: {0}")]
    WriteTask(String),
}

impl JobError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Assembly(error) if error.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = LoadError::DuplicateTimestamp {
            path: PathBuf::from("berlin.dat"),
            line: 12,
            timestamp: "2023-01-01T10:00:00+01:00".to_string(),
        };
        let text = AssemblyError::from(err).to_string();
        assert!(text.contains("berlin.dat"));
        assert!(text.contains("line 12"));
    }

    #[test]
    fn cancellation_is_recognised_through_wrappers() {
        let cancelled = AssemblyError::Cancelled {
            stage: PipelineState::Validated,
        };
        assert!(cancelled.is_cancelled());
        assert!(JobError::from(cancelled).is_cancelled());

        let calendar = AssemblyError::from(CalendarError::UnsupportedYear { year: 1 });
        assert!(!calendar.is_cancelled());
    }
}
