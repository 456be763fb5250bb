use ndarray::Array2;

use crate::consts::{EPSILON, MINIMUM_HISTOGRAM_BINS, MINIMUM_MAX_ITERATIONS};

/// Histogram of `data` over `bins` equal-width bins spanning [min, max].
///
/// Returns the counts together with the (min, max) used for binning, or
/// `None` for an empty or flat image.
pub fn histogram(data: &Array2<f32>, bins: usize) -> Option<(Vec<u64>, f32, f32)> {
    let (min, max) = min_max(data)?;
    if max - min <= EPSILON * max.abs().max(1.0) {
        return None;
    }
    let mut counts = vec![0u64; bins];
    for &v in data.iter() {
        counts[bin_of(v, min, max, bins)] += 1;
    }
    Some((counts, min, max))
}

/// Bin index of `value` in a histogram spanning [min, max].
pub fn bin_of(value: f32, min: f32, max: f32, bins: usize) -> usize {
    let scaled = (value - min) / (max - min) * bins as f32;
    (scaled.max(0.0) as usize).min(bins - 1)
}

fn min_max(data: &Array2<f32>) -> Option<(f32, f32)> {
    if data.is_empty() {
        return None;
    }
    let (min, max) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    Some((min, max))
}

/// "Minimum" threshold on a histogram: smooth with a 3-point running mean
/// until exactly two interior peaks remain, then take the valley between them.
///
/// Returns the bin index of the valley, or `None` if the histogram never
/// becomes bimodal.
pub fn minimum_threshold_bin(counts: &[u64]) -> Option<usize> {
    let n = counts.len();
    if n < 3 {
        return None;
    }
    let last_occupied = counts.iter().rposition(|&c| c > 0)?;

    let mut hist: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
    let mut smoothed = vec![0.0f64; n];
    let mut iterations = 0;

    while !is_bimodal(&hist) {
        smoothed[0] = (hist[0] + hist[1]) / 3.0;
        for i in 1..n - 1 {
            smoothed[i] = (hist[i - 1] + hist[i] + hist[i + 1]) / 3.0;
        }
        smoothed[n - 1] = (hist[n - 2] + hist[n - 1]) / 3.0;
        std::mem::swap(&mut hist, &mut smoothed);

        iterations += 1;
        if iterations > MINIMUM_MAX_ITERATIONS {
            return None;
        }
    }

    (1..last_occupied).find(|&i| hist[i - 1] > hist[i] && hist[i + 1] >= hist[i])
}

fn is_bimodal(hist: &[f64]) -> bool {
    let mut modes = 0;
    for k in 1..hist.len() - 1 {
        if hist[k - 1] < hist[k] && hist[k + 1] < hist[k] {
            modes += 1;
            if modes > 2 {
                return false;
            }
        }
    }
    modes == 2
}

/// Foreground mask of pixels brighter than the minimum-method threshold
/// (dark background polarity).
///
/// Returns `None` when no threshold can be determined.
pub fn minimum_threshold_mask(data: &Array2<f32>) -> Option<Array2<bool>> {
    let bins = MINIMUM_HISTOGRAM_BINS;
    let (counts, min, max) = histogram(data, bins)?;
    let level = minimum_threshold_bin(&counts)?;
    Some(data.mapv(|v| bin_of(v, min, max, bins) > level))
}
