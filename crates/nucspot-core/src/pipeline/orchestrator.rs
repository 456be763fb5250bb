use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::consts::{NUCLEUS_PREVIEW_SUFFIX, SPOT_PREVIEW_SUFFIX};
use crate::detection::{count_spots, enhance_spots, segment_nuclei};
use crate::error::{NucspotError, Result};
use crate::gate::{self, Artifact, CancelToken};
use crate::io::image_io::{preview_path, save_preview};
use crate::io::{discover_experiments, StackLoader};
use crate::preview::{render_nucleus_preview, render_spot_preview};
use crate::results::{ResultRow, ResultsTable};

use super::config::AnalysisConfig;
use super::types::{
    BatchReport, ImageAnalysis, ImageOutcome, NoOpReporter, PipelineStage, PreviewFailure,
    ProgressReporter, SkippedFile,
};

/// Analyze one stack: nuclei on the nucleus channel, spots on the spot
/// channel.
///
/// The LoG enhancement of the spot channel runs in the background while the
/// nuclei are segmented; its result is collected through the completion gate.
/// When the wait fails the enhancement is cancelled and drops its copy of the
/// spot channel.
pub fn analyze_image(
    path: &Path,
    config: &AnalysisConfig,
    loader: &dyn StackLoader,
    cancel: &CancelToken,
    reporter: &dyn ProgressReporter,
) -> Result<ImageAnalysis> {
    reporter.stage(PipelineStage::Loading);
    let stack = loader.load(path)?;
    let nucleus_channel = stack.channel(config.channels.nuclei)?;
    let spot_channel = stack.channel(config.channels.spots)?.to_owned();
    debug!(
        channels = stack.channel_count(),
        depth = stack.depth(),
        height = stack.height(),
        width = stack.width(),
        "Stack loaded"
    );

    let name = format!("LoG of {}", file_name(path));
    let spot_config = config.spots.clone();
    let task_name = name.clone();
    let pending = gate::spawn(name, move |task_cancel| {
        let enhanced = enhance_spots(&spot_channel.view(), &spot_config, task_cancel)?;
        Ok(Artifact::new(task_name, enhanced))
    });

    reporter.stage(PipelineStage::Nuclei);
    let nuclei = segment_nuclei(&nucleus_channel, &config.nucleus);
    drop(stack);

    reporter.stage(PipelineStage::Spots);
    let enhanced = pending.wait(&config.gate, cancel)?;
    let spots = count_spots(&enhanced, &config.spots);

    Ok(ImageAnalysis {
        path: path.to_path_buf(),
        nuclei,
        spots,
    })
}

/// Run the whole batch with the loader for `config.format` and no progress
/// reporting.
pub fn run_analysis(config: &AnalysisConfig) -> Result<BatchReport> {
    run_batch(
        config,
        config.format.loader(),
        Arc::new(NoOpReporter),
        &CancelToken::new(),
    )
}

/// Analyze every stack of every experiment under `config.root` and write the
/// summary table.
///
/// Experiments and their files are processed in lexical order. A stack that
/// cannot be analyzed is skipped without a row; a preview that cannot be
/// written is recorded but keeps its row. Only a failure to discover the
/// experiments or to write the table fails the batch, apart from
/// cancellation.
pub fn run_batch(
    config: &AnalysisConfig,
    loader: &dyn StackLoader,
    reporter: Arc<dyn ProgressReporter>,
    cancel: &CancelToken,
) -> Result<BatchReport> {
    config.validate()?;
    let experiments = discover_experiments(&config.root, loader.extensions())?;
    let total: usize = experiments.iter().map(|e| e.files.len()).sum();
    info!(
        root = %config.root.display(),
        experiments = experiments.len(),
        images = total,
        "Starting analysis"
    );
    reporter.begin_batch(total);

    let mut table = ResultsTable::new();
    let mut skipped = Vec::new();
    let mut preview_failures = Vec::new();

    for experiment in &experiments {
        for file in &experiment.files {
            if cancel.is_cancelled() {
                return Err(NucspotError::Cancelled);
            }
            reporter.begin_image(file);
            info!(experiment = %experiment.name, file = %file.display(), "Analyzing");

            let outcome = match analyze_image(file, config, loader, cancel, &*reporter) {
                Ok(analysis) => {
                    table.append(ResultRow {
                        experiment: experiment.name.clone(),
                        experiment_index: experiment.index,
                        file_name: file_name(file),
                        nucleus_count: analysis.nuclei.count,
                        spot_count: analysis.spots.count,
                    });
                    info!(
                        nuclei = analysis.nuclei.count,
                        spots = analysis.spots.count,
                        "Counted"
                    );
                    if config.output.write_previews {
                        reporter.stage(PipelineStage::Previews);
                        preview_failures.extend(write_previews(&analysis));
                    }
                    ImageOutcome::Counted {
                        nuclei: analysis.nuclei.count,
                        spots: analysis.spots.count,
                    }
                }
                Err(NucspotError::Cancelled) => return Err(NucspotError::Cancelled),
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Skipping image");
                    let reason = e.to_string();
                    skipped.push(SkippedFile {
                        path: file.clone(),
                        reason: reason.clone(),
                    });
                    ImageOutcome::Skipped { reason }
                }
            };
            reporter.finish_image(file, &outcome);
        }
    }

    let summary_path = config.root.join(&config.output.summary_file);
    table.write_csv(&summary_path)?;
    info!(path = %summary_path.display(), rows = table.len(), "Summary written");
    reporter.finish_batch();

    Ok(BatchReport {
        table,
        summary_path,
        experiments: experiments.len(),
        skipped,
        preview_failures,
    })
}

fn write_previews(analysis: &ImageAnalysis) -> Vec<PreviewFailure> {
    let previews = [
        (
            preview_path(&analysis.path, NUCLEUS_PREVIEW_SUFFIX),
            render_nucleus_preview(&analysis.nuclei),
        ),
        (
            preview_path(&analysis.path, SPOT_PREVIEW_SUFFIX),
            render_spot_preview(&analysis.spots),
        ),
    ];

    let mut failures = Vec::new();
    for (path, img) in previews {
        if let Err(e) = save_preview(&img, &path) {
            warn!(path = %path.display(), error = %e, "Failed to write preview");
            failures.push(PreviewFailure {
                path,
                reason: e.to_string(),
            });
        }
    }
    failures
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
