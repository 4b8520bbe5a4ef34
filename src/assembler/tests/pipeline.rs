//! End-to-end assembly of a clean region-year

use super::{YearFixture, berlin, write_year};
use crate::assembler::{PipelineState, SeriesAssembler, resample};
use crate::calendar::{Resolution, TimezoneRule};
use crate::config::EngineConfig;
use crate::error::{AssemblyError, ReconstructionError};
use crate::loader::load_series;
use crate::models::Channel;
use crate::reconstruct::{AuxiliaryKind, UniformReconstructor};
use crate::resample::downsample_column;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_hourly_year_to_quarter_hours() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_year(temp_dir.path(), "berlin_2023.dat", YearFixture::default());

    let assembler = SeriesAssembler::with_default_strategy(EngineConfig::default());
    let assembled = assembler
        .assemble_file(&path, Some(berlin()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        assembled.transitions,
        vec![
            PipelineState::Loaded,
            PipelineState::Split,
            PipelineState::Resampled,
            PipelineState::Reconstructed,
            PipelineState::Validated,
            PipelineState::Finalized,
        ]
    );
    assert_eq!(assembled.native_resolution, Resolution::HOUR);
    assert_eq!(assembled.series.len(), 35_040);
    assert_eq!(assembled.series.resolution(), Resolution::QUARTER_HOUR);
    assert!(assembled.anomalies.is_empty());
    assert!(
        assembled.report.passed(),
        "unexpected violations: {:?}",
        assembled.report.counts()
    );
    for channel in Channel::ALL {
        assert_eq!(assembled.series.missing_count(channel), 0, "{channel} has gaps");
    }
}

#[tokio::test]
async fn test_reconstruction_closes_against_source() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_year(temp_dir.path(), "berlin_2023.dat", YearFixture::default());
    let source = load_series(&path, TimezoneRule::CentralEuropean).unwrap().series;

    let assembler = SeriesAssembler::with_default_strategy(EngineConfig::default());
    let assembled = assembler
        .assemble_file(&path, Some(berlin()), &CancellationToken::new())
        .await
        .unwrap();

    for channel in Channel::IRRADIANCE {
        let recovered = downsample_column(&assembled.series.column(channel), 4);
        for (original, recovered) in source.column(channel).iter().zip(&recovered) {
            let (original, recovered) = (original.unwrap(), recovered.unwrap());
            assert!(
                (original - recovered).abs() <= 1e-6 + 1e-6 * original.abs(),
                "{channel}: {original} vs {recovered}"
            );
        }
    }
}

#[tokio::test]
async fn test_reassembly_is_identical() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_year(temp_dir.path(), "berlin_2023.dat", YearFixture::default());
    let assembler = SeriesAssembler::with_default_strategy(
        EngineConfig::default().with_target_resolution(Resolution::MINUTE),
    );
    let cancel = CancellationToken::new();

    let first = assembler
        .assemble_file(&path, Some(berlin()), &cancel)
        .await
        .unwrap();
    let second = assembler
        .assemble_file(&path, Some(berlin()), &cancel)
        .await
        .unwrap();

    assert_eq!(first.series.len(), 525_600);
    assert_eq!(first.series, second.series);
    assert_eq!(first.report, second.report);
}

#[tokio::test]
async fn test_native_resolution_target_keeps_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_year(temp_dir.path(), "berlin_2023.dat", YearFixture::default());
    let source = load_series(&path, TimezoneRule::CentralEuropean).unwrap().series;

    let assembler = SeriesAssembler::with_default_strategy(
        EngineConfig::default().with_target_resolution(Resolution::HOUR),
    );
    let assembled = assembler
        .assemble_file(&path, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(assembled.series.observations(), source.observations());
}

#[tokio::test]
async fn test_uniform_strategy_needs_no_location() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_year(temp_dir.path(), "anywhere_2023.dat", YearFixture::default());

    let assembler = SeriesAssembler::new(EngineConfig::default(), Arc::new(UniformReconstructor));
    let assembled = assembler
        .assemble_file(&path, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(assembled.series.len(), 35_040);
    assert!(assembled.series.region().is_none());
}

#[tokio::test]
async fn test_clear_sky_strategy_without_location_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_year(temp_dir.path(), "anywhere_2023.dat", YearFixture::default());

    let assembler = SeriesAssembler::with_default_strategy(EngineConfig::default());
    let err = assembler
        .assemble_file(&path, None, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        AssemblyError::Reconstruction(ReconstructionError::MissingAuxiliary { input, .. }) => {
            assert_eq!(input, AuxiliaryKind::ClearSky);
        }
        other => panic!("Expected MissingAuxiliary, got {other:?}"),
    }
}

#[test]
fn test_sync_resample_matches_assembler_counts() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_year(temp_dir.path(), "berlin_2023.dat", YearFixture::default());
    let series = load_series(&path, TimezoneRule::CentralEuropean)
        .unwrap()
        .series
        .with_region(berlin());

    for (target, expected) in [
        (Resolution::MINUTE, 525_600),
        (Resolution::QUARTER_HOUR, 35_040),
        (Resolution::HOUR, 8_760),
    ] {
        let resampled = resample(&series, target, &UniformReconstructor).unwrap();
        assert_eq!(resampled.len(), expected);
        assert_eq!(resampled.resolution(), target);
    }
}
