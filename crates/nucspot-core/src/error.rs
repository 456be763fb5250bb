use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NucspotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stack file: {0}")]
    InvalidStack(String),

    #[error("Unsupported pixel mode {0}")]
    UnsupportedPixelMode(i32),

    #[error("Channel {index} out of range (stack has {total})")]
    ChannelOutOfRange { index: usize, total: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timed out after {waited:?} waiting for '{name}'")]
    WaitTimeout { name: String, waited: Duration },

    #[error("Expected artifact '{expected}', found '{found}'")]
    ArtifactMismatch { expected: String, found: String },

    #[error("Background task '{name}' failed: {reason}")]
    TaskFailed { name: String, reason: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("No such directory: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, NucspotError>;
