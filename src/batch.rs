//! Concurrent assembly of many region files.
//!
//! Each file is an independent pipeline; a failed file is recorded in its
//! outcome and does not stop the others. Concurrency is bounded by
//! `max_concurrent_regions`.

use crate::assembler::SeriesAssembler;
use crate::error::JobError;
use crate::models::Region;
use crate::writer::{OutputFormat, output_path_for, write_series};

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// One region file to assemble.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchJob {
    pub path: PathBuf,
    pub region: Option<Region>,
}

impl BatchJob {
    pub fn new(path: impl Into<PathBuf>, region: Option<Region>) -> Self {
        Self {
            path: path.into(),
            region,
        }
    }
}

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub observations: usize,
    pub violations: usize,
    pub anomalies: usize,
    pub uncovered_slots: usize,
    pub output: Option<PathBuf>,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub path: PathBuf,
    pub result: Result<JobSummary, JobError>,
}

/// Totals for a batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub files_cancelled: usize,
    pub total_observations: usize,
    pub total_violations: usize,
    pub processing_time_ms: u128,
}

impl BatchStats {
    fn record(&mut self, outcome: &BatchOutcome) {
        match &outcome.result {
            Ok(summary) => {
                self.files_processed += 1;
                self.total_observations += summary.observations;
                self.total_violations += summary.violations;
            }
            Err(error) if error.is_cancelled() => self.files_cancelled += 1,
            Err(_) => self.files_failed += 1,
        }
    }
}

/// Runs jobs through a shared assembler and optionally writes the results.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    assembler: SeriesAssembler,
    output: Option<(PathBuf, OutputFormat)>,
    show_progress: bool,
}

impl BatchProcessor {
    pub fn new(assembler: SeriesAssembler) -> Self {
        Self {
            assembler,
            output: None,
            show_progress: false,
        }
    }

    /// Write each assembled series into `dir`
    pub fn with_output(mut self, dir: PathBuf, format: OutputFormat) -> Self {
        self.output = Some((dir, format));
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub async fn run(
        &self,
        jobs: Vec<BatchJob>,
        cancel: &CancellationToken,
    ) -> (Vec<BatchOutcome>, BatchStats) {
        let start = Instant::now();
        let concurrency = self
            .assembler
            .config()
            .max_concurrent_regions
            .min(jobs.len())
            .max(1);
        debug!("Assembling {} files with concurrency {}", jobs.len(), concurrency);

        let progress = self.progress_bar(jobs.len());

        let outcomes: Vec<BatchOutcome> = stream::iter(jobs)
            .map(|job| {
                let progress = progress.clone();
                async move {
                    if let Some(name) = job.path.file_name() {
                        progress.set_message(format!("Assembling: {}", name.to_string_lossy()));
                    }
                    let result = self.run_job(&job, cancel).await;
                    progress.inc(1);

                    if let Err(e) = &result {
                        if !e.is_cancelled() {
                            error!("Failed to assemble {}: {}", job.path.display(), e);
                        }
                    }
                    BatchOutcome {
                        path: job.path,
                        result,
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        progress.finish_and_clear();

        let mut stats = BatchStats::default();
        for outcome in &outcomes {
            stats.record(outcome);
        }
        stats.processing_time_ms = start.elapsed().as_millis();
        (outcomes, stats)
    }

    async fn run_job(&self, job: &BatchJob, cancel: &CancellationToken) -> Result<JobSummary, JobError> {
        let assembled = self
            .assembler
            .assemble_file(&job.path, job.region.clone(), cancel)
            .await?;

        let output = match &self.output {
            Some((dir, format)) => {
                let path = output_path_for(dir, &job.path, &assembled.series, *format);
                let series = assembled.series.clone();
                let format = *format;
                let target = path.clone();
                task::spawn_blocking(move || write_series(&series, &target, format))
                    .await
                    .map_err(|e| JobError::WriteTask(e.to_string()))??;
                Some(path)
            }
            None => None,
        };

        Ok(JobSummary {
            observations: assembled.series.len(),
            violations: assembled.report.violations().len(),
            anomalies: assembled.anomalies.len(),
            uncovered_slots: assembled.uncovered_slots,
            output,
        })
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress.set_style(style);
        progress
    }
}
