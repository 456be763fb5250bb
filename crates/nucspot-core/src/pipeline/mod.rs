pub mod config;
mod orchestrator;
mod types;

pub use config::{AnalysisConfig, ChannelConfig, OutputConfig};
pub use orchestrator::{analyze_image, run_analysis, run_batch};
pub use types::{
    BatchReport, ImageAnalysis, ImageOutcome, PipelineStage, PreviewFailure, ProgressReporter,
    SkippedFile,
};
