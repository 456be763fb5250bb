use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use nucspot_core::gate::CancelToken;
use nucspot_core::io::StackFormat;
use nucspot_core::pipeline::{
    run_batch, AnalysisConfig, ImageOutcome, PipelineStage, ProgressReporter,
};

use crate::summary::{print_analysis_summary, print_batch_report};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Root folder with one subfolder per experiment
    pub root: PathBuf,

    /// Analysis config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stack file format: dv or nd2
    #[arg(long)]
    pub format: Option<StackFormat>,

    /// Disk radius of the closing applied to the nucleus mask
    #[arg(long)]
    pub closing_radius: Option<usize>,

    /// Smallest nucleus area in pixels
    #[arg(long)]
    pub min_nucleus_area: Option<usize>,

    /// Upper bound of the quantized spot threshold range
    #[arg(long)]
    pub spot_threshold: Option<u16>,

    /// Smallest spot volume in voxels
    #[arg(long)]
    pub min_spot_volume: Option<usize>,

    /// Count spots that touch the volume border
    #[arg(long)]
    pub keep_edge_spots: bool,

    /// Do not write preview images
    #[arg(long)]
    pub no_previews: bool,

    /// Give up on a single image after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Progress bar over images, with the current stage as message.
struct BarReporter {
    pb: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn begin_batch(&self, total_images: usize) {
        self.pb.set_length(total_images as u64);
        self.pb.set_position(0);
    }

    fn begin_image(&self, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.pb.set_prefix(name);
    }

    fn stage(&self, stage: PipelineStage) {
        self.pb.set_message(stage.to_string());
    }

    fn finish_image(&self, path: &Path, outcome: &ImageOutcome) {
        if let ImageOutcome::Skipped { reason } = outcome {
            self.pb
                .println(format!("  skipped {}: {}", path.display(), reason));
        }
        self.pb.inc(1);
    }

    fn finish_batch(&self) {
        self.pb.finish_with_message("Done");
    }
}

pub fn run(args: &AnalyzeArgs) -> Result<()> {
    let config = build_config(args)?;
    config.validate().context("Invalid analysis config")?;

    print_analysis_summary(&config);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:24} {msg:20} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    let reporter = Arc::new(BarReporter { pb });

    let report = run_batch(&config, config.format.loader(), reporter, &CancelToken::new())
        .with_context(|| format!("Analysis of {} failed", config.root.display()))?;

    print_batch_report(&report);
    Ok(())
}

fn build_config(args: &AnalyzeArgs) -> Result<AnalysisConfig> {
    let mut config = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        let mut config: AnalysisConfig =
            toml::from_str(&contents).context("Invalid analysis config")?;
        config.root = args.root.clone();
        config
    } else {
        AnalysisConfig::new(args.root.clone())
    };

    if let Some(format) = args.format {
        config.format = format;
    }
    if let Some(radius) = args.closing_radius {
        config.nucleus.closing_radius = radius;
    }
    if let Some(area) = args.min_nucleus_area {
        config.nucleus.min_area = area;
    }
    if let Some(upper) = args.spot_threshold {
        config.spots.threshold.upper = upper;
    }
    if let Some(volume) = args.min_spot_volume {
        config.spots.min_volume = volume;
    }
    if args.keep_edge_spots {
        config.spots.exclude_edges = false;
    }
    if args.no_previews {
        config.output.write_previews = false;
    }
    if let Some(secs) = args.timeout_secs {
        config.gate.timeout_ms = secs.saturating_mul(1000);
    }

    Ok(config)
}
