use ndarray::{Array2, Zip};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Offsets `(dr, dc)` of a disk structuring element of the given radius.
pub fn disk_offsets(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let r2 = r * r;
    let mut offsets = Vec::new();
    for dr in -r..=r {
        for dc in -r..=r {
            if dr * dr + dc * dc <= r2 {
                offsets.push((dr, dc));
            }
        }
    }
    offsets
}

/// Morphological closing (dilation followed by erosion) with a disk.
///
/// Merges ragged boundaries and fills gaps narrower than the disk. Pixels
/// outside the image never contribute, so the result always contains the
/// input mask.
pub fn closing_disk(mask: &Array2<bool>, radius: usize) -> Array2<bool> {
    if radius == 0 {
        return mask.clone();
    }
    let offsets = disk_offsets(radius);
    let dilated = dilate(mask, &offsets);
    erode(&dilated, &offsets)
}

/// Binary dilation: true if ANY in-bounds pixel under the element is true.
pub fn dilate(mask: &Array2<bool>, offsets: &[(isize, isize)]) -> Array2<bool> {
    apply(mask, |row, col| {
        neighbours(mask, offsets, row, col).any(|v| v)
    })
}

/// Binary erosion: true if ALL in-bounds pixels under the element are true.
pub fn erode(mask: &Array2<bool>, offsets: &[(isize, isize)]) -> Array2<bool> {
    apply(mask, |row, col| {
        mask[[row, col]] && neighbours(mask, offsets, row, col).all(|v| v)
    })
}

fn neighbours<'a>(
    mask: &'a Array2<bool>,
    offsets: &'a [(isize, isize)],
    row: usize,
    col: usize,
) -> impl Iterator<Item = bool> + 'a {
    let (h, w) = mask.dim();
    offsets.iter().filter_map(move |&(dr, dc)| {
        let nr = row as isize + dr;
        let nc = col as isize + dc;
        if nr < 0 || nc < 0 || nr >= h as isize || nc >= w as isize {
            None
        } else {
            Some(mask[[nr as usize, nc as usize]])
        }
    })
}

fn apply<F>(mask: &Array2<bool>, keep: F) -> Array2<bool>
where
    F: Fn(usize, usize) -> bool + Sync,
{
    let mut out = Array2::from_elem(mask.dim(), false);
    if mask.len() >= PARALLEL_PIXEL_THRESHOLD {
        Zip::indexed(&mut out).par_for_each(|(row, col), o| *o = keep(row, col));
    } else {
        Zip::indexed(&mut out).for_each(|(row, col), o| *o = keep(row, col));
    }
    out
}
