use std::path::{Path, PathBuf};

use crate::detection::{NucleusSegmentation, SpotDetection};
use crate::results::ResultsTable;

/// Per-image processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Loading,
    Nuclei,
    Spots,
    Previews,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "Loading stack"),
            Self::Nuclei => write!(f, "Segmenting nuclei"),
            Self::Spots => write!(f, "Detecting spots"),
            Self::Previews => write!(f, "Writing previews"),
        }
    }
}

/// Counts and intermediate results for one stack.
#[derive(Clone, Debug)]
pub struct ImageAnalysis {
    pub path: PathBuf,
    pub nuclei: NucleusSegmentation,
    pub spots: SpotDetection,
}

/// How one image ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageOutcome {
    Counted { nuclei: usize, spots: usize },
    Skipped { reason: String },
}

/// A stack that produced no row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// A preview that could not be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviewFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of a whole batch run.
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    pub table: ResultsTable,
    pub summary_path: PathBuf,
    pub experiments: usize,
    pub skipped: Vec<SkippedFile>,
    pub preview_failures: Vec<PreviewFailure>,
}

/// Thread-safe progress reporting for a batch.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// The batch is about to process `total_images` stacks.
    fn begin_batch(&self, _total_images: usize) {}

    /// Processing of one stack started.
    fn begin_image(&self, _path: &Path) {}

    /// A stage within the current stack started.
    fn stage(&self, _stage: PipelineStage) {}

    /// Processing of one stack ended.
    fn finish_image(&self, _path: &Path, _outcome: &ImageOutcome) {}

    /// The summary table has been written.
    fn finish_batch(&self) {}
}

/// No-op progress reporter, used when `run_analysis` delegates.
pub(super) struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
