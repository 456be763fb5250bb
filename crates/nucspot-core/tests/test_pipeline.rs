#[allow(dead_code)]
mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::Array3;
use parking_lot::Mutex;
use tempfile::TempDir;

use nucspot_core::error::{NucspotError, Result};
use nucspot_core::gate::CancelToken;
use nucspot_core::io::{DvLoader, Nd2Loader, StackFormat, StackLoader};
use nucspot_core::pipeline::{
    analyze_image, run_analysis, run_batch, AnalysisConfig, ImageOutcome, ProgressReporter,
};
use nucspot_core::results::ResultsTable;
use nucspot_core::volume::ImageStack;

fn write_sample(dir: &Path, name: &str) -> PathBuf {
    common::write_dv(dir, name, &[common::nucleus_volume(), common::spot_volume()])
}

fn write_black(dir: &Path, name: &str) -> PathBuf {
    let black = Array3::<f32>::zeros(common::SPOT_DIM);
    common::write_dv(dir, name, &[black.clone(), black])
}

/// Root with experiment folders `alpha` (one file) and `beta` (two files).
fn build_root() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let alpha = tmp.path().join("alpha");
    let beta = tmp.path().join("beta");
    fs::create_dir(&alpha).unwrap();
    fs::create_dir(&beta).unwrap();
    write_sample(&alpha, "cell1.dv");
    write_sample(&beta, "cell1.dv");
    write_black(&beta, "cell2.dv");
    tmp
}

#[derive(Default)]
struct RecordingReporter {
    total: Mutex<Option<usize>>,
    outcomes: Mutex<Vec<ImageOutcome>>,
    finished: Mutex<bool>,
}

impl ProgressReporter for RecordingReporter {
    fn begin_batch(&self, total_images: usize) {
        *self.total.lock() = Some(total_images);
    }

    fn finish_image(&self, _path: &Path, outcome: &ImageOutcome) {
        self.outcomes.lock().push(outcome.clone());
    }

    fn finish_batch(&self) {
        *self.finished.lock() = true;
    }
}

// ---------------------------------------------------------------------------
// Single image
// ---------------------------------------------------------------------------

#[test]
fn test_analyze_image_counts() {
    let tmp = TempDir::new().unwrap();
    let path = write_sample(tmp.path(), "a.dv");
    let config = AnalysisConfig::new(tmp.path());

    let analysis = analyze_image(
        &path,
        &config,
        &DvLoader,
        &CancelToken::new(),
        &RecordingReporter::default(),
    )
    .unwrap();
    assert_eq!(analysis.nuclei.count, 2);
    assert_eq!(analysis.spots.count, 3);
    assert_eq!(analysis.path, path);
}

#[test]
fn test_analyze_image_swapped_channels() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_dv(
        tmp.path(),
        "swapped.dv",
        &[common::spot_volume(), common::nucleus_volume()],
    );
    let mut config = AnalysisConfig::new(tmp.path());
    config.channels.nuclei = 1;
    config.channels.spots = 0;

    let analysis = analyze_image(
        &path,
        &config,
        &DvLoader,
        &CancelToken::new(),
        &RecordingReporter::default(),
    )
    .unwrap();
    assert_eq!(analysis.nuclei.count, 2);
    assert_eq!(analysis.spots.count, 3);
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

#[test]
fn test_batch_rows_and_indices() {
    let root = build_root();
    let report = run_analysis(&AnalysisConfig::new(root.path())).unwrap();

    assert_eq!(report.experiments, 2);
    assert!(report.skipped.is_empty());
    assert!(report.preview_failures.is_empty());

    let rows = report.table.rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows.iter().map(|r| r.experiment_index).collect::<Vec<_>>(),
        vec![0, 1, 1]
    );
    assert_eq!(
        rows.iter().map(|r| r.experiment.as_str()).collect::<Vec<_>>(),
        vec!["alpha", "beta", "beta"]
    );
    assert_eq!(rows[0].file_name, "cell1.dv");
    assert_eq!((rows[0].nucleus_count, rows[0].spot_count), (2, 3));
    assert_eq!((rows[1].nucleus_count, rows[1].spot_count), (2, 3));
    // All-black stack still gets a row.
    assert_eq!(rows[2].file_name, "cell2.dv");
    assert_eq!((rows[2].nucleus_count, rows[2].spot_count), (0, 0));

    let summary = root.path().join("FileSummary.csv");
    assert_eq!(report.summary_path, summary);
    assert_eq!(ResultsTable::read_csv(&summary).unwrap(), report.table);
}

#[test]
fn test_batch_writes_previews() {
    let root = build_root();
    run_analysis(&AnalysisConfig::new(root.path())).unwrap();
    for name in ["cell1_seg.jpg", "cell1_spots.jpg", "cell2_seg.jpg", "cell2_spots.jpg"] {
        assert!(root.path().join("beta").join(name).is_file(), "{name}");
    }
    assert!(root.path().join("alpha/cell1_seg.jpg").is_file());
}

#[test]
fn test_batch_without_previews() {
    let root = build_root();
    let mut config = AnalysisConfig::new(root.path());
    config.output.write_previews = false;
    run_analysis(&config).unwrap();
    assert!(!root.path().join("alpha/cell1_seg.jpg").exists());
    assert!(root.path().join("FileSummary.csv").is_file());
}

#[test]
fn test_rerun_is_idempotent() {
    let root = build_root();
    let config = AnalysisConfig::new(root.path());
    let summary = root.path().join("FileSummary.csv");

    run_analysis(&config).unwrap();
    let first = fs::read_to_string(&summary).unwrap();
    let report = run_analysis(&config).unwrap();
    let second = fs::read_to_string(&summary).unwrap();

    assert_eq!(first, second);
    assert_eq!(report.table.len(), 3);
}

#[test]
fn test_unreadable_file_is_skipped() {
    let root = build_root();
    fs::write(root.path().join("alpha/broken.dv"), b"not a stack").unwrap();

    let reporter = Arc::new(RecordingReporter::default());
    let report = run_batch(
        &AnalysisConfig::new(root.path()),
        &DvLoader,
        reporter.clone(),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.table.len(), 3);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].path.ends_with("broken.dv"));
    assert!(report.table.rows().iter().all(|r| r.file_name != "broken.dv"));

    assert_eq!(*reporter.total.lock(), Some(4));
    let outcomes = reporter.outcomes.lock();
    assert_eq!(outcomes.len(), 4);
    // alpha/broken.dv sorts before alpha/cell1.dv.
    assert!(matches!(outcomes[0], ImageOutcome::Skipped { .. }));
    assert_eq!(outcomes[1], ImageOutcome::Counted { nuclei: 2, spots: 3 });
    assert!(*reporter.finished.lock());
}

#[test]
fn test_overflowing_header_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let exp = tmp.path().join("exp");
    fs::create_dir(&exp).unwrap();
    let mut header = common::build_dv_header(1 << 30, 1 << 30, 2, 2, 2, 0, true);
    header.extend_from_slice(&[0u8; 64]);
    fs::write(exp.join("a.dv"), &header).unwrap();
    write_sample(&exp, "b.dv");

    let mut config = AnalysisConfig::new(tmp.path());
    config.output.write_previews = false;
    let report = run_analysis(&config).unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].path.ends_with("a.dv"));
    assert_eq!(report.table.len(), 1);
    assert_eq!(report.table.rows()[0].file_name, "b.dv");
    assert_eq!(report.table.rows()[0].spot_count, 3);
}

#[test]
fn test_single_channel_file_is_skipped() {
    let root = build_root();
    common::write_dv(&root.path().join("beta"), "mono.dv", &[common::nucleus_volume()]);
    let report = run_analysis(&AnalysisConfig::new(root.path())).unwrap();
    assert_eq!(report.table.len(), 3);
    assert_eq!(report.skipped.len(), 1);
}

#[test]
fn test_preview_failure_keeps_row() {
    let root = build_root();
    // A directory where the preview file should go makes the write fail.
    fs::create_dir(root.path().join("alpha/cell1_seg.jpg")).unwrap();

    let report = run_analysis(&AnalysisConfig::new(root.path())).unwrap();
    assert_eq!(report.table.len(), 3);
    assert_eq!(report.preview_failures.len(), 1);
    assert!(report.preview_failures[0].path.ends_with("cell1_seg.jpg"));
    assert!(root.path().join("alpha/cell1_spots.jpg").is_file());
}

#[test]
fn test_empty_root_writes_header_only() {
    let tmp = TempDir::new().unwrap();
    let report = run_analysis(&AnalysisConfig::new(tmp.path())).unwrap();
    assert!(report.table.is_empty());
    assert_eq!(report.experiments, 0);
    let text = fs::read_to_string(tmp.path().join("FileSummary.csv")).unwrap();
    assert_eq!(text.lines().count(), 1);
}

#[test]
fn test_missing_root_fails() {
    let tmp = TempDir::new().unwrap();
    let config = AnalysisConfig::new(tmp.path().join("missing"));
    assert!(matches!(
        run_analysis(&config),
        Err(NucspotError::MissingDirectory(_))
    ));
}

#[test]
fn test_invalid_config_fails_before_work() {
    let root = build_root();
    let mut config = AnalysisConfig::new(root.path());
    config.spots.sigma_xy = -1.0;
    assert!(matches!(
        run_analysis(&config),
        Err(NucspotError::InvalidConfig(_))
    ));
    assert!(!root.path().join("FileSummary.csv").exists());
}

#[test]
fn test_cancelled_batch_writes_nothing() {
    let root = build_root();
    let cancel = CancelToken::new();
    cancel.cancel();
    let result = run_batch(
        &AnalysisConfig::new(root.path()),
        &DvLoader,
        Arc::new(RecordingReporter::default()),
        &cancel,
    );
    assert!(matches!(result, Err(NucspotError::Cancelled)));
    assert!(!root.path().join("FileSummary.csv").exists());
}

// ---------------------------------------------------------------------------
// ND2 input
// ---------------------------------------------------------------------------

#[test]
fn test_analyze_nd2_image() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_nd2(
        tmp.path(),
        "a.nd2",
        &[common::nucleus_volume(), common::spot_volume()],
    );
    let analysis = analyze_image(
        &path,
        &AnalysisConfig::new(tmp.path()),
        &Nd2Loader,
        &CancelToken::new(),
        &RecordingReporter::default(),
    )
    .unwrap();
    assert_eq!(analysis.nuclei.count, 2);
    assert_eq!(analysis.spots.count, 3);
}

#[test]
fn test_nd2_batch_ignores_dv_files() {
    let tmp = TempDir::new().unwrap();
    let exp = tmp.path().join("plate");
    fs::create_dir(&exp).unwrap();
    common::write_nd2(&exp, "well1.nd2", &[common::nucleus_volume(), common::spot_volume()]);
    write_sample(&exp, "other.dv");

    let mut config = AnalysisConfig::new(tmp.path());
    config.format = StackFormat::Nd2;
    config.output.write_previews = false;
    let report = run_analysis(&config).unwrap();

    assert!(report.skipped.is_empty());
    let rows = report.table.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].file_name, "well1.nd2");
    assert_eq!((rows[0].nucleus_count, rows[0].spot_count), (2, 3));
}

// ---------------------------------------------------------------------------
// Custom loader
// ---------------------------------------------------------------------------

/// Serves the same synthetic stack for every `.stk` file.
struct SyntheticLoader;

impl StackLoader for SyntheticLoader {
    fn load(&self, path: &Path) -> Result<ImageStack> {
        if path.file_stem().is_some_and(|s| s == "fail") {
            return Err(NucspotError::InvalidStack("synthetic failure".into()));
        }
        Ok(common::stack_from(&[common::nucleus_volume(), common::spot_volume()]))
    }

    fn extensions(&self) -> &[&str] {
        &["stk"]
    }
}

#[test]
fn test_custom_loader() {
    let tmp = TempDir::new().unwrap();
    let exp = tmp.path().join("exp");
    fs::create_dir(&exp).unwrap();
    fs::write(exp.join("a.stk"), b"").unwrap();
    fs::write(exp.join("fail.stk"), b"").unwrap();
    write_sample(&exp, "ignored.dv");

    let mut config = AnalysisConfig::new(tmp.path());
    config.output.write_previews = false;
    let report = run_batch(
        &config,
        &SyntheticLoader,
        Arc::new(RecordingReporter::default()),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.table.len(), 1);
    assert_eq!(report.table.rows()[0].file_name, "a.stk");
    assert_eq!(report.table.rows()[0].spot_count, 3);
    assert_eq!(report.skipped.len(), 1);
}
