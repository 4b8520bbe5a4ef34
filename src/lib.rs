//! TMY Resampler Library
//!
//! Ingestion and resampling engine for Typical Meteorological Year series.
//! Region files hold one year of interval means for ten channels at 1, 15 or
//! 60 minute resolution, timestamped in CET/CEST. The engine loads them into
//! gap-checked series, resamples the slowly varying channels by exact
//! integration of a midpoint-anchored interpolant, reconstructs sub-hourly
//! irradiance through a pluggable strategy whose output must close against
//! the coarse means, and validates the result against physical bounds.
//!
//! Engine entry points:
//! - [`load_series`] reads a region file under a timezone rule
//! - [`resample`] converts a series to another resolution
//! - [`validate`] produces a [`ValidationReport`]
//! - [`SeriesAssembler`] runs the whole pipeline with cancellation support

pub mod assembler;
pub mod batch;
pub mod calendar;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod loader;
pub mod models;
pub mod reconstruct;
pub mod resample;
pub mod solar;
pub mod validate;
pub mod writer;

pub use assembler::{Assembled, PipelineState, SeriesAssembler, resample, resample_with};
pub use calendar::{Calendar, LeapDayPolicy, Resolution, TimezoneRule, timestamps_for};
pub use config::EngineConfig;
pub use error::{
    AssemblyError, CalendarError, LoadError, ReconstructionError, Result, ValidationFailure,
};
pub use loader::{Loaded, load_series};
pub use models::{Channel, Observation, Region, Series};
pub use reconstruct::{
    AuxiliaryChannels, ClearSkyIndexReconstructor, ReconstructionStrategy, UniformReconstructor,
};
pub use validate::{ValidationReport, Verdict, validate};
