use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_CLOSING_RADIUS, DEFAULT_MAX_NUCLEUS_AREA, DEFAULT_MAX_SPOT_VOLUME,
    DEFAULT_MIN_NUCLEUS_AREA, DEFAULT_MIN_SPOT_VOLUME, DEFAULT_SPOT_SIGMA_XY,
    DEFAULT_SPOT_SIGMA_Z, DEFAULT_SPOT_THRESHOLD_LOWER, DEFAULT_SPOT_THRESHOLD_UPPER,
    DEFAULT_WATERSHED_TOLERANCE,
};
use crate::error::{NucspotError, Result};

/// Configuration for nucleus segmentation on the Z projection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NucleusConfig {
    /// Radius of the disk used for morphological closing.
    #[serde(default = "default_closing_radius")]
    pub closing_radius: usize,
    /// Minimum component area (pixels) to be counted as a nucleus.
    #[serde(default = "default_min_area")]
    pub min_area: usize,
    /// Maximum component area (pixels) to be counted as a nucleus.
    #[serde(default = "default_max_area")]
    pub max_area: usize,
    /// Height of distance-map maxima used to seed the watershed.
    #[serde(default = "default_watershed_tolerance")]
    pub watershed_tolerance: f32,
}

fn default_closing_radius() -> usize {
    DEFAULT_CLOSING_RADIUS
}
fn default_min_area() -> usize {
    DEFAULT_MIN_NUCLEUS_AREA
}
fn default_max_area() -> usize {
    DEFAULT_MAX_NUCLEUS_AREA
}
fn default_watershed_tolerance() -> f32 {
    DEFAULT_WATERSHED_TOLERANCE
}

impl Default for NucleusConfig {
    fn default() -> Self {
        Self {
            closing_radius: DEFAULT_CLOSING_RADIUS,
            min_area: DEFAULT_MIN_NUCLEUS_AREA,
            max_area: DEFAULT_MAX_NUCLEUS_AREA,
            watershed_tolerance: DEFAULT_WATERSHED_TOLERANCE,
        }
    }
}

impl NucleusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_area > self.max_area {
            return Err(NucspotError::InvalidConfig(format!(
                "nucleus min_area {} exceeds max_area {}",
                self.min_area, self.max_area
            )));
        }
        if !(self.watershed_tolerance.is_finite() && self.watershed_tolerance >= 0.0) {
            return Err(NucspotError::InvalidConfig(format!(
                "watershed_tolerance must be a non-negative number, got {}",
                self.watershed_tolerance
            )));
        }
        Ok(())
    }
}

/// Inclusive range of quantized LoG values treated as spot foreground.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdRange {
    pub lower: u16,
    pub upper: u16,
}

impl Default for ThresholdRange {
    fn default() -> Self {
        Self {
            lower: DEFAULT_SPOT_THRESHOLD_LOWER,
            upper: DEFAULT_SPOT_THRESHOLD_UPPER,
        }
    }
}

impl ThresholdRange {
    pub fn contains(&self, value: u16) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Configuration for 3D spot detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpotConfig {
    /// Lateral (x and y) LoG sigma in pixels.
    #[serde(default = "default_sigma_xy")]
    pub sigma_xy: f32,
    /// Axial LoG sigma in slices.
    #[serde(default = "default_sigma_z")]
    pub sigma_z: f32,
    /// Quantized values inside this range are spot voxels.
    #[serde(default)]
    pub threshold: ThresholdRange,
    /// Minimum object volume (voxels).
    #[serde(default = "default_min_volume")]
    pub min_volume: usize,
    /// Maximum object volume (voxels).
    #[serde(default = "default_max_volume")]
    pub max_volume: usize,
    /// Drop objects with a voxel on any face of the volume.
    #[serde(default = "default_exclude_edges")]
    pub exclude_edges: bool,
}

fn default_sigma_xy() -> f32 {
    DEFAULT_SPOT_SIGMA_XY
}
fn default_sigma_z() -> f32 {
    DEFAULT_SPOT_SIGMA_Z
}
fn default_min_volume() -> usize {
    DEFAULT_MIN_SPOT_VOLUME
}
fn default_max_volume() -> usize {
    DEFAULT_MAX_SPOT_VOLUME
}
fn default_exclude_edges() -> bool {
    true
}

impl Default for SpotConfig {
    fn default() -> Self {
        Self {
            sigma_xy: DEFAULT_SPOT_SIGMA_XY,
            sigma_z: DEFAULT_SPOT_SIGMA_Z,
            threshold: ThresholdRange::default(),
            min_volume: DEFAULT_MIN_SPOT_VOLUME,
            max_volume: DEFAULT_MAX_SPOT_VOLUME,
            exclude_edges: true,
        }
    }
}

impl SpotConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, sigma) in [("sigma_xy", self.sigma_xy), ("sigma_z", self.sigma_z)] {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(NucspotError::InvalidConfig(format!(
                    "{name} must be positive, got {sigma}"
                )));
            }
        }
        if self.threshold.lower > self.threshold.upper {
            return Err(NucspotError::InvalidConfig(format!(
                "spot threshold lower {} exceeds upper {}",
                self.threshold.lower, self.threshold.upper
            )));
        }
        if self.min_volume > self.max_volume {
            return Err(NucspotError::InvalidConfig(format!(
                "spot min_volume {} exceeds max_volume {}",
                self.min_volume, self.max_volume
            )));
        }
        Ok(())
    }
}
