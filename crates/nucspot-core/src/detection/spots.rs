use ndarray::{Array3, ArrayView3};
use tracing::debug;

use crate::consts::{EPSILON, QUANTIZED_MAX};
use crate::error::Result;
use crate::filters::log3d::laplacian_of_gaussian_3d;
use crate::gate::CancelToken;

use super::components::{label_objects, relabel_3d};
use super::config::SpotConfig;

/// LoG-filtered spot channel, the output of the enhancement step.
#[derive(Clone, Debug)]
pub struct EnhancedVolume {
    pub response: Array3<f32>,
    /// Largest absolute input sample, used to judge whether the response
    /// range is meaningful.
    pub input_peak: f32,
}

/// Result of spot detection on one channel.
#[derive(Clone, Debug)]
pub struct SpotDetection {
    /// Number of objects that passed the volume and edge filters.
    pub count: usize,
    /// Counted spots labeled 1..=count in raster order, 0 elsewhere.
    pub labels: Array3<u32>,
}

/// Blob enhancement: 3D LoG with the configured sigmas.
///
/// Stops early with `Cancelled` once `cancel` is set.
pub fn enhance_spots(
    channel: &ArrayView3<f32>,
    config: &SpotConfig,
    cancel: &CancelToken,
) -> Result<EnhancedVolume> {
    let input_peak = channel.iter().fold(0.0f32, |acc, &v| acc.max(v.abs()));
    let response = laplacian_of_gaussian_3d(channel, config.sigma_xy, config.sigma_z, cancel)?;
    Ok(EnhancedVolume {
        response,
        input_peak,
    })
}

/// Linearly rescale the response to 0..=65535 (min -> 0, max -> 65535).
///
/// Returns `None` when the response is flat relative to the input.
pub fn quantize(enhanced: &EnhancedVolume) -> Option<Array3<u16>> {
    let response = &enhanced.response;
    if response.is_empty() {
        return None;
    }
    let (min, max) = response
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= EPSILON * enhanced.input_peak.max(1.0) {
        return None;
    }
    let scale = QUANTIZED_MAX / range;
    Some(response.mapv(|v| num_traits::clamp((v - min) * scale + 0.5, 0.0, QUANTIZED_MAX) as u16))
}

/// Threshold, label, and filter an enhanced spot volume.
///
/// Quantized values inside the threshold range are foreground (low values
/// are strong negative LoG responses, i.e. bright blobs). Objects are
/// 26-connected; volume bounds and edge exclusion follow `config`.
pub fn count_spots(enhanced: &EnhancedVolume, config: &SpotConfig) -> SpotDetection {
    let dim = enhanced.response.dim();
    let Some(quantized) = quantize(enhanced) else {
        debug!("Flat LoG response, spot count is 0");
        return SpotDetection {
            count: 0,
            labels: Array3::zeros(dim),
        };
    };

    let mask = quantized.mapv(|q| config.threshold.contains(q));
    let (labels, stats) = label_objects(&mask);
    let (labels, count) = relabel_3d(&labels, &stats, |o| {
        o.volume >= config.min_volume
            && o.volume <= config.max_volume
            && !(config.exclude_edges && o.touches_border(dim))
    });

    debug!(candidates = stats.len(), count, "Spot detection complete");

    SpotDetection { count, labels }
}

/// Enhance and count in one synchronous call.
pub fn detect_spots(channel: &ArrayView3<f32>, config: &SpotConfig) -> Result<SpotDetection> {
    let enhanced = enhance_spots(channel, config, &CancelToken::new())?;
    Ok(count_spots(&enhanced, config))
}
