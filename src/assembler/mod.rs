//! Series assembly pipeline.
//!
//! Drives one region-year through load, channel split, slow-channel
//! resampling, irradiance reconstruction, merge and validation. The two
//! channel groups are processed as parallel blocking tasks and joined before
//! the merge; cancellation is checked between stages and a failed or
//! cancelled run never yields a partial series.

#[cfg(test)]
pub mod tests;

use crate::calendar::Resolution;
use crate::config::EngineConfig;
use crate::error::{AssemblyError, Result, ValidationFailure};
use crate::loader::{BoundaryAnomaly, LoadOptions, Loaded, load_series_with_timeout};
use crate::models::{Channel, ChannelColumns, Region, Series};
use crate::reconstruct::{
    AuxiliaryChannels, ClearSkyIndexReconstructor, ReconstructionStrategy, reconstruct,
};
use crate::resample::{IntervalResampler, downsample_column};
use crate::validate::{ConsistencyValidator, ValidationReport};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stages of an assembly run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Loaded,
    Split,
    Resampled,
    Reconstructed,
    Validated,
    Finalized,
    Failed,
}

impl PipelineState {
    /// Successor on the success path; `None` for terminal states
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Loaded => Some(Self::Split),
            Self::Split => Some(Self::Resampled),
            Self::Resampled => Some(Self::Reconstructed),
            Self::Reconstructed => Some(Self::Validated),
            Self::Validated => Some(Self::Finalized),
            Self::Finalized | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loaded => "loaded",
            Self::Split => "split",
            Self::Resampled => "resampled",
            Self::Reconstructed => "reconstructed",
            Self::Validated => "validated",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A finalized series with everything learned while producing it.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub series: Series,
    pub report: ValidationReport,
    pub anomalies: Vec<BoundaryAnomaly>,
    pub native_resolution: Resolution,
    /// Calendar slots with no source row
    pub uncovered_slots: usize,
    /// States visited, ending in [`PipelineState::Finalized`]
    pub transitions: Vec<PipelineState>,
    pub source: Option<PathBuf>,
}

/// Tracks the state machine of one run.
struct Run {
    transitions: Vec<PipelineState>,
}

impl Run {
    fn start() -> Self {
        Self {
            transitions: vec![PipelineState::Loaded],
        }
    }

    fn state(&self) -> PipelineState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(PipelineState::Loaded)
    }

    /// Move to the next state unless cancellation was requested.
    fn advance(&mut self, cancel: &CancellationToken) -> Result<PipelineState> {
        let next = self.state().next().unwrap_or(PipelineState::Failed);
        if cancel.is_cancelled() {
            return Err(AssemblyError::Cancelled { stage: next });
        }
        debug!("Pipeline {} -> {}", self.state(), next);
        self.transitions.push(next);
        Ok(next)
    }

    /// Log a failure; the visited states are discarded with the run.
    fn fail(&self, error: &AssemblyError) {
        warn!("Assembly failed after {}: {}", self.state(), error);
    }
}

/// Assembles region series at a configured resolution.
#[derive(Debug, Clone)]
pub struct SeriesAssembler {
    config: EngineConfig,
    strategy: Arc<dyn ReconstructionStrategy>,
}

impl SeriesAssembler {
    pub fn new(config: EngineConfig, strategy: Arc<dyn ReconstructionStrategy>) -> Self {
        Self { config, strategy }
    }

    /// Assembler using the clear-sky index reconstruction
    pub fn with_default_strategy(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(ClearSkyIndexReconstructor::default()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn strategy(&self) -> &dyn ReconstructionStrategy {
        self.strategy.as_ref()
    }

    /// Load a region file and assemble it.
    pub async fn assemble_file(
        &self,
        path: &Path,
        region: Option<Region>,
        cancel: &CancellationToken,
    ) -> Result<Assembled> {
        if cancel.is_cancelled() {
            return Err(AssemblyError::Cancelled {
                stage: PipelineState::Loaded,
            });
        }

        let options = LoadOptions::new(self.config.timezone).with_leap_day(self.config.leap_day);
        let mut loaded =
            load_series_with_timeout(path.to_path_buf(), options, self.config.load_timeout).await?;
        if let Some(region) = region {
            loaded.series = loaded.series.with_region(region);
        }

        self.assemble_loaded(loaded, cancel).await
    }

    /// Assemble an already loaded series.
    pub async fn assemble_loaded(
        &self,
        loaded: Loaded,
        cancel: &CancellationToken,
    ) -> Result<Assembled> {
        let start = Instant::now();
        let Loaded {
            series,
            native_resolution,
            anomalies,
            uncovered_slots,
            source,
            ..
        } = loaded;

        if !anomalies.is_empty() {
            warn!(
                "{}: {} boundary anomalies, {} uncovered slots",
                source.display(),
                anomalies.len(),
                uncovered_slots
            );
        }

        let mut run = Run::start();
        let result = self.run_stages(&mut run, series, cancel).await;

        match result {
            Ok((series, report)) => {
                info!(
                    "Assembled {} ({} -> {}, {} observations) in {}ms",
                    source.display(),
                    native_resolution,
                    series.resolution(),
                    series.len(),
                    start.elapsed().as_millis()
                );
                Ok(Assembled {
                    series,
                    report,
                    anomalies,
                    native_resolution,
                    uncovered_slots,
                    transitions: run.transitions,
                    source: Some(source),
                })
            }
            Err(error) => {
                run.fail(&error);
                Err(error)
            }
        }
    }

    async fn run_stages(
        &self,
        run: &mut Run,
        series: Series,
        cancel: &CancellationToken,
    ) -> Result<(Series, ValidationReport)> {
        let target = self.config.target_resolution;
        let target_calendar = series.calendar().with_resolution(target);
        let region = series.region().cloned();

        run.advance(cancel)?;
        let series = Arc::new(series);

        let slow_task = task::spawn_blocking({
            let series = Arc::clone(&series);
            let resampler = IntervalResampler::new(self.config.preserve_interval_means);
            move || resampler.resample(&series, target)
        });
        let irradiance_task = task::spawn_blocking({
            let series = Arc::clone(&series);
            let strategy = Arc::clone(&self.strategy);
            let config = self.config.clone();
            move || resample_irradiance(&series, target, strategy.as_ref(), &config)
        });
        let (slow, irradiance) = tokio::join!(slow_task, irradiance_task);

        let slow = slow.map_err(|e| AssemblyError::TaskFailed {
            stage: PipelineState::Resampled,
            reason: e.to_string(),
        })??;
        run.advance(cancel)?;
        let irradiance = irradiance.map_err(|e| AssemblyError::TaskFailed {
            stage: PipelineState::Reconstructed,
            reason: e.to_string(),
        })??;
        run.advance(cancel)?;

        let merged = Series::from_columns(target_calendar, region, &slow.merge(irradiance))?;

        let report = ConsistencyValidator::new(self.config.consistency).validate(&merged);
        if !report.passed() {
            if self.config.strict_validation {
                return Err(ValidationFailure { report }.into());
            }
            warn!(
                "Validation reported {} violations (non-strict, continuing)",
                report.violations().len()
            );
        }
        run.advance(cancel)?;

        run.advance(cancel)?;
        Ok((merged, report))
    }
}

/// Irradiance columns at `target`: copied, block-averaged or reconstructed.
fn resample_irradiance(
    series: &Series,
    target: Resolution,
    strategy: &dyn ReconstructionStrategy,
    config: &EngineConfig,
) -> Result<ChannelColumns> {
    let from = series.resolution();
    if target == from {
        return Ok(series.columns(&Channel::IRRADIANCE));
    }

    if target > from {
        let factor = from.subdivisions_of(target)?;
        let mut columns = ChannelColumns::new();
        for channel in Channel::IRRADIANCE {
            columns.insert(channel, downsample_column(&series.column(channel), factor));
        }
        return Ok(columns);
    }

    let fine_calendar = series.calendar().with_resolution(target);
    let auxiliary = match series.region() {
        Some(region) if !strategy.required_auxiliary().is_empty() => {
            AuxiliaryChannels::for_region(&fine_calendar, region)
        }
        _ => AuxiliaryChannels::new(),
    };
    let fine = reconstruct(
        series,
        target,
        strategy,
        &auxiliary,
        &config.closure_tolerance,
    )?;
    Ok(fine.columns(&Channel::IRRADIANCE))
}

/// Resample every channel of `series` to `target` with default settings.
pub fn resample(
    series: &Series,
    target: Resolution,
    strategy: &dyn ReconstructionStrategy,
) -> Result<Series> {
    resample_with(series, target, strategy, &EngineConfig::default())
}

/// Resample every channel of `series` to `target`.
///
/// Slow channels go through [`IntervalResampler`]; irradiance is
/// block-averaged when coarsening and reconstructed by `strategy` when
/// refining. No validation is performed.
pub fn resample_with(
    series: &Series,
    target: Resolution,
    strategy: &dyn ReconstructionStrategy,
    config: &EngineConfig,
) -> Result<Series> {
    let slow = IntervalResampler::new(config.preserve_interval_means).resample(series, target)?;
    let irradiance = resample_irradiance(series, target, strategy, config)?;
    let calendar = series.calendar().with_resolution(target);
    Ok(Series::from_columns(
        calendar,
        series.region().cloned(),
        &slow.merge(irradiance),
    )?)
}
