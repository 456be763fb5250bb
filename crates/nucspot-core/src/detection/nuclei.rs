use ndarray::{Array2, ArrayView3};
use tracing::debug;

use crate::volume::max_projection;

use super::components::{label_components, relabel_2d};
use super::config::NucleusConfig;
use super::morphology::closing_disk;
use super::threshold::minimum_threshold_mask;
use super::watershed::watershed_split;

/// Result of nucleus segmentation on one channel.
#[derive(Clone, Debug)]
pub struct NucleusSegmentation {
    /// Number of nuclei that passed the size filter.
    pub count: usize,
    /// Maximum-intensity projection the segmentation was computed on.
    pub projection: Array2<f32>,
    /// Counted nuclei labeled 1..=count, 0 elsewhere.
    pub labels: Array2<u32>,
}

impl NucleusSegmentation {
    fn empty(projection: Array2<f32>) -> Self {
        let labels = Array2::zeros(projection.dim());
        Self {
            count: 0,
            projection,
            labels,
        }
    }
}

/// Segment and count nuclei in a (z, y, x) channel.
///
/// Pipeline: Z max projection -> minimum-method threshold -> disk closing ->
/// distance-transform watershed -> 8-connected components with area filter.
///
/// A channel with no usable threshold, or whose mask is all background or
/// all foreground, yields a count of 0.
pub fn segment_nuclei(channel: &ArrayView3<f32>, config: &NucleusConfig) -> NucleusSegmentation {
    let (d, h, w) = channel.dim();
    if d == 0 || h == 0 || w == 0 {
        return NucleusSegmentation::empty(Array2::zeros((h, w)));
    }

    let projection = max_projection(channel);

    let Some(mask) = minimum_threshold_mask(&projection) else {
        debug!("No bimodal histogram, nucleus count is 0");
        return NucleusSegmentation::empty(projection);
    };

    let closed = closing_disk(&mask, config.closing_radius);
    let foreground = closed.iter().filter(|&&v| v).count();
    if foreground == 0 || foreground == closed.len() {
        debug!(foreground, "Degenerate nucleus mask, count is 0");
        return NucleusSegmentation::empty(projection);
    }

    let split = watershed_split(&closed, config.watershed_tolerance);
    let (labels, stats) = label_components(&split);
    let (labels, count) = relabel_2d(&labels, &stats, |c| {
        c.area >= config.min_area && c.area <= config.max_area
    });

    debug!(
        candidates = stats.len(),
        count,
        "Nucleus segmentation complete"
    );

    NucleusSegmentation {
        count,
        projection,
        labels,
    }
}
