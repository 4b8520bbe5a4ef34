//! Command-line interface components.

use crate::assembler::SeriesAssembler;
use crate::batch::{BatchJob, BatchProcessor, BatchStats};
use crate::calendar::{LeapDayPolicy, Resolution};
use crate::catalog::{RegionCatalog, StaticCatalog};
use crate::config::EngineConfig;
use crate::loader::{LoadOptions, load_series_with_timeout};
use crate::models::Region;
use crate::reconstruct::{ClearSkyIndexReconstructor, ReconstructionStrategy, UniformReconstructor};
use crate::validate::ConsistencyValidator;
use crate::writer::OutputFormat;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StrategyKind {
    /// Shape each coarse interval by the clear-sky profile (needs --catalog or --latitude/--longitude)
    #[default]
    ClearSky,
    /// Repeat each coarse mean across its sub-intervals
    Uniform,
}

#[derive(Parser, Debug)]
#[command(name = "tmy_resampler")]
#[command(about = "Resample Typical Meteorological Year series to 1, 15 or 60 minute resolution")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Region files or directories containing *.dat files
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output directory for resampled series
    #[arg(short, long, default_value = "resampled")]
    pub output: PathBuf,

    /// Target resolution: 1m, 15m, 60m or seconds
    #[arg(short, long, default_value = "15m", value_parser = parse_resolution)]
    pub resolution: Resolution,

    #[arg(long, value_enum, default_value_t = OutputFormat::Parquet)]
    pub format: OutputFormat,

    /// Irradiance reconstruction strategy. Refining below hourly with
    /// clear-sky needs --catalog or --latitude/--longitude
    #[arg(long, value_enum, default_value_t = StrategyKind::ClearSky)]
    pub strategy: StrategyKind,

    /// Fail files whose validation report has violations
    #[arg(long)]
    pub strict: bool,

    /// Seconds allowed for reading one file
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Files assembled concurrently (defaults to the CPU count)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Region table with columns id,name,longitude,latitude,file
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Latitude for files not found in the catalog
    #[arg(long, requires = "longitude", allow_hyphen_values = true)]
    pub latitude: Option<f64>,

    /// Longitude for files not found in the catalog
    #[arg(long, requires = "latitude", allow_hyphen_values = true)]
    pub longitude: Option<f64>,

    /// Keep Feb 29 in leap years instead of dropping it
    #[arg(long)]
    pub keep_leap_day: bool,

    /// Load and validate inputs at native resolution without resampling
    #[arg(long)]
    pub validate_only: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default()
            .with_target_resolution(self.resolution)
            .with_load_timeout(Duration::from_secs(self.timeout_secs));
        if self.keep_leap_day {
            config = config.with_leap_day(LeapDayPolicy::Keep);
        }
        if self.strict {
            config = config.with_strict_validation();
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_max_concurrent_regions(concurrency);
        }
        config
    }

    pub fn strategy(&self) -> Arc<dyn ReconstructionStrategy> {
        match self.strategy {
            StrategyKind::ClearSky => Arc::new(ClearSkyIndexReconstructor::default()),
            StrategyKind::Uniform => Arc::new(UniformReconstructor),
        }
    }

    /// Reject runs that would reconstruct clear-sky irradiance without any
    /// way to locate the inputs.
    pub fn check_location(&self) -> Result<()> {
        let reconstructs = !self.validate_only && self.resolution < Resolution::HOUR;
        let located = self.catalog.is_some() || (self.latitude.is_some() && self.longitude.is_some());
        if reconstructs && self.strategy == StrategyKind::ClearSky && !located {
            anyhow::bail!(
                "--strategy clear-sky needs a location: pass --catalog or --latitude and --longitude, or use --strategy uniform"
            );
        }
        Ok(())
    }

    /// Region for `path`: catalog entry first, then the command-line location
    pub fn region_for(&self, catalog: Option<&StaticCatalog>, path: &Path) -> Option<Region> {
        if let Some(region) = catalog.and_then(|catalog| catalog.region_for_file(path)) {
            return Some(region.clone());
        }
        let (latitude, longitude) = (self.latitude?, self.longitude?);
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(Region::new(stem.clone(), stem, longitude, latitude))
    }
}

/// Accepts `1m`, `15m`, `60m`, `1h` or a number of seconds
pub fn parse_resolution(value: &str) -> std::result::Result<Resolution, String> {
    let value = value.trim().to_ascii_lowercase();
    let seconds = if let Some(minutes) = value.strip_suffix('m') {
        minutes.parse::<u32>().map(|m| m * 60)
    } else if let Some(hours) = value.strip_suffix('h') {
        hours.parse::<u32>().map(|h| h * 3_600)
    } else {
        value.trim_end_matches('s').parse::<u32>()
    }
    .map_err(|_| format!("invalid resolution '{value}'"))?;

    let resolution = Resolution::new(seconds).map_err(|e| e.to_string())?;
    if !resolution.is_file_resolution() {
        return Err(format!("resolution must be 1m, 15m or 60m, got {resolution}"));
    }
    Ok(resolution)
}

/// Input file discovery
pub mod input_discovery {
    use super::*;

    /// Expand directories to their `*.dat` files; plain files pass through.
    pub fn discover_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for input in inputs {
            if input.is_dir() {
                let pattern = input.join("*.dat");
                let pattern = pattern.to_string_lossy();
                let entries = glob::glob(&pattern)
                    .with_context(|| format!("Invalid glob pattern for {}", input.display()))?;
                let mut found: Vec<PathBuf> = entries
                    .collect::<std::result::Result<_, _>>()
                    .with_context(|| format!("Failed to read directory {}", input.display()))?;
                found.sort();
                if found.is_empty() {
                    anyhow::bail!("No .dat files found in {}", input.display());
                }
                files.extend(found);
            } else if input.is_file() {
                files.push(input.clone());
            } else {
                anyhow::bail!("Input not found: {}", input.display());
            }
        }

        Ok(files)
    }
}

/// Set up structured logging on stderr
pub fn setup_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tmy_resampler={}", log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Run the command described by `args`
pub async fn run(args: Args, cancel: CancellationToken) -> Result<BatchStats> {
    args.check_location()?;
    let files = input_discovery::discover_inputs(&args.inputs)?;
    let catalog = match &args.catalog {
        Some(path) => Some(
            StaticCatalog::from_csv_file(path)
                .with_context(|| format!("Failed to load catalog {}", path.display()))?,
        ),
        None => None,
    };
    let config = args.engine_config();

    println!("{}", "TMY resampling".bright_green().bold());
    println!("  {} {}", "Inputs:".bright_cyan(), files.len());
    println!("  {} {}", "Target:".bright_cyan(), config.target_resolution);

    let jobs: Vec<BatchJob> = files
        .iter()
        .map(|path| BatchJob::new(path.clone(), args.region_for(catalog.as_ref(), path)))
        .collect();

    if args.validate_only {
        return validate_only(jobs, &config, &cancel).await;
    }

    println!("  {} {}", "Output:".bright_cyan(), args.output.display());
    let processor = BatchProcessor::new(SeriesAssembler::new(config, args.strategy()))
        .with_output(args.output.clone(), args.format)
        .with_progress(!args.verbose);
    let (outcomes, stats) = processor.run(jobs, &cancel).await;

    println!("\n{}", "Summary".bright_green().bold());
    for outcome in &outcomes {
        match &outcome.result {
            Ok(summary) => {
                let marker = if summary.violations == 0 {
                    "ok".bright_green()
                } else {
                    "warn".bright_yellow()
                };
                println!(
                    "  [{}] {} ({} violations, {} anomalies)",
                    marker,
                    outcome.path.display(),
                    summary.violations,
                    summary.anomalies
                );
            }
            Err(error) => println!("  [{}] {}: {}", "fail".bright_red(), outcome.path.display(), error),
        }
    }
    print_stats(&stats);

    if cancel.is_cancelled() {
        anyhow::bail!("Processing interrupted by user");
    }
    if stats.files_failed > 0 {
        anyhow::bail!("{} of {} files failed", stats.files_failed, outcomes.len());
    }
    Ok(stats)
}

async fn validate_only(
    jobs: Vec<BatchJob>,
    config: &EngineConfig,
    cancel: &CancellationToken,
) -> Result<BatchStats> {
    let validator = ConsistencyValidator::new(config.consistency);
    let mut stats = BatchStats::default();

    for job in jobs {
        if cancel.is_cancelled() {
            anyhow::bail!("Validation interrupted by user");
        }
        let options = LoadOptions::new(config.timezone).with_leap_day(config.leap_day);
        let loaded = match load_series_with_timeout(job.path.clone(), options, config.load_timeout).await {
            Ok(loaded) => loaded,
            Err(error) => {
                println!("  [{}] {}: {}", "fail".bright_red(), job.path.display(), error);
                stats.files_failed += 1;
                continue;
            }
        };
        let series = match job.region {
            Some(region) => loaded.series.with_region(region),
            None => loaded.series,
        };
        let report = validator.validate(&series);

        println!(
            "  [{}] {} ({}, {} anomalies, {} uncovered slots)",
            report.verdict(),
            job.path.display(),
            loaded.native_resolution,
            loaded.anomalies.len(),
            loaded.uncovered_slots
        );
        for (label, count) in report.counts() {
            println!("      {} {}", label.bright_yellow(), count);
        }

        stats.files_processed += 1;
        stats.total_observations += series.len();
        stats.total_violations += report.violations().len();
    }

    print_stats(&stats);
    Ok(stats)
}

fn print_stats(stats: &BatchStats) {
    println!(
        "  {} {}",
        "Files processed:".bright_cyan(),
        stats.files_processed.to_string().bright_white()
    );
    if stats.files_failed > 0 {
        println!(
            "  {} {}",
            "Files failed:".bright_red(),
            stats.files_failed.to_string().bright_red().bold()
        );
    }
    if stats.files_cancelled > 0 {
        println!(
            "  {} {}",
            "Files cancelled:".bright_yellow(),
            stats.files_cancelled
        );
    }
    println!(
        "  {} {}",
        "Observations:".bright_cyan(),
        stats.total_observations.to_string().bright_white().bold()
    );
    println!(
        "  {} {}",
        "Violations:".bright_cyan(),
        stats.total_violations.to_string().bright_white()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolution_flag_accepts_common_spellings() {
        assert_eq!(parse_resolution("1m"), Ok(Resolution::MINUTE));
        assert_eq!(parse_resolution("15m"), Ok(Resolution::QUARTER_HOUR));
        assert_eq!(parse_resolution("1h"), Ok(Resolution::HOUR));
        assert_eq!(parse_resolution("3600"), Ok(Resolution::HOUR));
        assert_eq!(parse_resolution("900s"), Ok(Resolution::QUARTER_HOUR));
        assert!(parse_resolution("30m").is_err());
        assert!(parse_resolution("fast").is_err());
    }

    #[test]
    fn args_build_engine_config() {
        let args = Args::parse_from([
            "tmy_resampler",
            "data",
            "--resolution",
            "60m",
            "--strict",
            "--keep-leap-day",
            "--concurrency",
            "3",
            "--latitude",
            "52.5",
            "--longitude",
            "-1.5",
        ]);
        let config = args.engine_config();
        assert_eq!(config.target_resolution, Resolution::HOUR);
        assert!(config.strict_validation);
        assert_eq!(config.leap_day, LeapDayPolicy::Keep);
        assert_eq!(config.max_concurrent_regions, 3);

        let region = args.region_for(None, Path::new("data/leeds_2023.dat")).unwrap();
        assert_eq!(region.id, "leeds_2023");
        assert!((region.longitude + 1.5).abs() < 1e-12);
    }

    #[test]
    fn clear_sky_without_location_is_rejected_up_front() {
        let parse = |extra: &[&str]| {
            let mut argv = vec!["tmy_resampler", "data"];
            argv.extend_from_slice(extra);
            Args::parse_from(argv)
        };

        let err = parse(&[]).check_location().unwrap_err();
        assert!(err.to_string().contains("--latitude"), "{err}");
        assert!(parse(&["--resolution", "1m"]).check_location().is_err());

        assert!(parse(&["--strategy", "uniform"]).check_location().is_ok());
        assert!(parse(&["--resolution", "1h"]).check_location().is_ok());
        assert!(parse(&["--validate-only"]).check_location().is_ok());
        assert!(parse(&["--catalog", "regions.csv"]).check_location().is_ok());
        assert!(
            parse(&["--latitude", "52.5", "--longitude", "13.4"])
                .check_location()
                .is_ok()
        );
    }

    #[test]
    fn discovers_dat_files_in_directories() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("b.dat"), "").unwrap();
        std::fs::write(temp_dir.path().join("a.dat"), "").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "").unwrap();

        let files = input_discovery::discover_inputs(&[temp_dir.path().to_path_buf()]).unwrap();
        assert_eq!(
            files,
            vec![temp_dir.path().join("a.dat"), temp_dir.path().join("b.dat")]
        );

        let missing = input_discovery::discover_inputs(&[temp_dir.path().join("nope")]);
        assert!(missing.is_err());
    }
}
