/// Minimum element count (pixels or voxels) to use rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Small epsilon used to detect a degenerate (flat) intensity range.
pub const EPSILON: f32 = 1e-6;

/// Channel holding the nucleus stain.
pub const DEFAULT_NUCLEUS_CHANNEL: usize = 0;

/// Channel holding the spot stain.
pub const DEFAULT_SPOT_CHANNEL: usize = 1;

/// Disk radius (pixels) of the closing applied to the nucleus mask.
pub const DEFAULT_CLOSING_RADIUS: usize = 5;

/// Smallest projected nucleus area (pixels) that is counted.
pub const DEFAULT_MIN_NUCLEUS_AREA: usize = 100;

/// Largest projected nucleus area (pixels) that is counted.
pub const DEFAULT_MAX_NUCLEUS_AREA: usize = 10_000_000;

/// Height of the extended maxima used as watershed seeds (distance units).
pub const DEFAULT_WATERSHED_TOLERANCE: f32 = 0.5;

/// Number of histogram bins for the minimum-between-peaks threshold.
pub const MINIMUM_HISTOGRAM_BINS: usize = 256;

/// Smoothing passes after which the minimum method gives up.
pub const MINIMUM_MAX_ITERATIONS: usize = 10_000;

/// Lateral LoG sigma (pixels).
pub const DEFAULT_SPOT_SIGMA_XY: f32 = 1.5;

/// Axial LoG sigma (slices).
pub const DEFAULT_SPOT_SIGMA_Z: f32 = 3.0;

/// Full scale of the quantized LoG response.
pub const QUANTIZED_MAX: f32 = 65_535.0;

/// Lower bound of the quantized spot threshold range.
pub const DEFAULT_SPOT_THRESHOLD_LOWER: u16 = 0;

/// Upper bound of the quantized spot threshold range.
pub const DEFAULT_SPOT_THRESHOLD_UPPER: u16 = 20_000;

/// Smallest spot volume (voxels) that is counted.
pub const DEFAULT_MIN_SPOT_VOLUME: usize = 10;

/// Largest spot volume (voxels) that is counted.
pub const DEFAULT_MAX_SPOT_VOLUME: usize = 76_546_048;

/// Give up waiting for the enhanced volume after this long.
pub const DEFAULT_GATE_TIMEOUT_MS: u64 = 600_000;

/// First poll interval of the completion gate.
pub const DEFAULT_GATE_POLL_INTERVAL_MS: u64 = 2;

/// Poll interval ceiling reached by doubling.
pub const DEFAULT_GATE_MAX_POLL_INTERVAL_MS: u64 = 200;

/// Name of the summary table written to the root folder.
pub const SUMMARY_FILE_NAME: &str = "FileSummary.csv";

/// Suffix of the nucleus segmentation preview.
pub const NUCLEUS_PREVIEW_SUFFIX: &str = "_seg";

/// Suffix of the spot label preview.
pub const SPOT_PREVIEW_SUFFIX: &str = "_spots";

/// Folder created inside the input folder when converting without `--output`.
pub const DEFAULT_CONVERTED_DIR: &str = "converted";
