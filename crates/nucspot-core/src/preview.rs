use image::{Rgb, RgbImage};
use ndarray::Array2;

use crate::consts::EPSILON;
use crate::detection::{NucleusSegmentation, SpotDetection};
use crate::volume::max_projection_labels;

/// Number of entries in the categorical label palette.
pub const PALETTE_SIZE: usize = 256;

const OUTLINE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const GOLDEN_ANGLE_DEG: f32 = 137.507_76;

/// Grayscale projection with the outline of every counted nucleus.
pub fn render_nucleus_preview(seg: &NucleusSegmentation) -> RgbImage {
    let (h, w) = seg.projection.dim();
    let gray = to_gray(&seg.projection);
    let mut img = RgbImage::new(w as u32, h as u32);

    for row in 0..h {
        for col in 0..w {
            let pixel = if is_outline(&seg.labels, row, col) {
                OUTLINE_COLOR
            } else {
                let g = gray[[row, col]];
                Rgb([g, g, g])
            };
            img.put_pixel(col as u32, row as u32, pixel);
        }
    }
    img
}

/// Z projection of the spot labels in categorical colors, with the display
/// range set to `[0, count]`.
pub fn render_spot_preview(spots: &SpotDetection) -> RgbImage {
    let projected = max_projection_labels(&spots.labels.view());
    let (h, w) = projected.dim();
    let palette = categorical_palette();
    let mut img = RgbImage::new(w as u32, h as u32);

    for ((row, col), &label) in projected.indexed_iter() {
        let index = palette_index(label, spots.count);
        img.put_pixel(col as u32, row as u32, palette[index]);
    }
    img
}

/// Map a label onto the palette with display range `[0, count]`.
pub fn palette_index(label: u32, count: usize) -> usize {
    if label == 0 || count == 0 {
        return 0;
    }
    let scaled = (label as f32 * (PALETTE_SIZE - 1) as f32 / count as f32).round() as usize;
    scaled.clamp(1, PALETTE_SIZE - 1)
}

/// Black followed by 255 well separated colors (golden-angle hue steps with
/// alternating saturation and value).
pub fn categorical_palette() -> Vec<Rgb<u8>> {
    let mut palette = Vec::with_capacity(PALETTE_SIZE);
    palette.push(Rgb([0, 0, 0]));
    for i in 1..PALETTE_SIZE {
        let hue = (i as f32 * GOLDEN_ANGLE_DEG) % 360.0;
        let saturation = if i % 2 == 0 { 0.65 } else { 0.95 };
        let value = if i % 3 == 0 { 0.75 } else { 1.0 };
        palette.push(hsv_to_rgb(hue, saturation, value));
    }
    palette
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Rgb<u8> {
    let c = value * saturation;
    let hp = hue / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = value - c;
    let to_u8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb([to_u8(r), to_u8(g), to_u8(b)])
}

/// Auto-contrast a projection to 8-bit.
fn to_gray(data: &Array2<f32>) -> Array2<u8> {
    let (min, max) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= EPSILON {
        return Array2::zeros(data.dim());
    }
    data.mapv(|v| ((v - min) / range * 255.0).round().clamp(0.0, 255.0) as u8)
}

/// A labeled pixel whose 4-neighbourhood leaves its region.
fn is_outline(labels: &Array2<u32>, row: usize, col: usize) -> bool {
    let label = labels[[row, col]];
    if label == 0 {
        return false;
    }
    let (h, w) = labels.dim();
    row == 0
        || col == 0
        || row + 1 == h
        || col + 1 == w
        || labels[[row - 1, col]] != label
        || labels[[row + 1, col]] != label
        || labels[[row, col - 1]] != label
        || labels[[row, col + 1]] != label
}
