use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use ndarray::Array2;

/// Stand-in for "no background on this line" in the distance transform.
const EDT_INFINITY: f64 = 1e20;

const NEIGHBOURS_8: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Split touching objects in a binary mask.
///
/// Distance-transform watershed: the Euclidean distance map of the mask is
/// flooded from its extended maxima (maxima rising at least `tolerance`
/// above their surroundings). Pixels where two basins meet are removed, so
/// the returned regions are separated under 8-connectivity.
pub fn watershed_split(mask: &Array2<bool>, tolerance: f32) -> Array2<bool> {
    let distance = distance_transform(mask);
    let markers = extended_maxima(&distance, mask, tolerance);
    let labels = flood(&distance, mask, &markers);
    labels.mapv(|l| l != 0)
}

/// Exact Euclidean distance from every foreground pixel to the nearest
/// background pixel (0 on background). Pixels outside the image are not
/// background.
pub fn distance_transform(mask: &Array2<bool>) -> Array2<f32> {
    let (h, w) = mask.dim();
    let mut sq = mask.mapv(|fg| if fg { EDT_INFINITY } else { 0.0 });

    let n = h.max(w);
    let mut line = vec![0.0f64; n];
    let mut out = vec![0.0f64; n];
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f64; n + 1];

    for col in 0..w {
        for row in 0..h {
            line[row] = sq[[row, col]];
        }
        edt_1d(&line[..h], &mut out[..h], &mut v, &mut z);
        for row in 0..h {
            sq[[row, col]] = out[row];
        }
    }
    for row in 0..h {
        for col in 0..w {
            line[col] = sq[[row, col]];
        }
        edt_1d(&line[..w], &mut out[..w], &mut v, &mut z);
        for col in 0..w {
            sq[[row, col]] = out[col];
        }
    }

    sq.mapv(|d| d.sqrt() as f32)
}

/// Lower envelope of parabolas (Felzenszwalb & Huttenlocher).
fn edt_1d(f: &[f64], d: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }
    let intersect = |q: usize, p: usize| {
        let (qf, pf) = (q as f64, p as f64);
        ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
    };

    let mut k = 0usize;
    v[0] = 0;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;
    for q in 1..n {
        let mut s = intersect(q, v[k]);
        while s <= z[k] {
            k -= 1;
            s = intersect(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }

    k = 0;
    for (q, dq) in d.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let delta = q as f64 - v[k] as f64;
        *dq = delta * delta + f[v[k]];
    }
}

#[derive(Clone, Copy, Debug)]
struct Queued {
    value: f32,
    seq: u64,
    row: usize,
    col: usize,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Highest value first; first-in first-out among equal values.
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

fn neighbours_8(
    row: usize,
    col: usize,
    h: usize,
    w: usize,
) -> impl Iterator<Item = (usize, usize)> {
    NEIGHBOURS_8.iter().filter_map(move |&(dr, dc)| {
        let nr = row as isize + dr;
        let nc = col as isize + dc;
        if nr < 0 || nc < 0 || nr >= h as isize || nc >= w as isize {
            None
        } else {
            Some((nr as usize, nc as usize))
        }
    })
}

/// Label the extended maxima of `f` inside `mask` (1-based, 0 elsewhere).
///
/// Computes the h-maxima transform by reconstruction of `f - h` under `f`,
/// then labels its regional maxima.
pub fn extended_maxima(f: &Array2<f32>, mask: &Array2<bool>, h: f32) -> Array2<u32> {
    let (height, width) = f.dim();
    let mut rec = Array2::<f32>::zeros((height, width));
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;

    for ((row, col), &fg) in mask.indexed_iter() {
        if fg {
            let value = (f[[row, col]] - h).max(0.0);
            rec[[row, col]] = value;
            heap.push(Queued { value, seq, row, col });
            seq += 1;
        }
    }

    while let Some(Queued { value, row, col, .. }) = heap.pop() {
        if value < rec[[row, col]] {
            continue;
        }
        for (nr, nc) in neighbours_8(row, col, height, width) {
            if !mask[[nr, nc]] {
                continue;
            }
            let candidate = value.min(f[[nr, nc]]);
            if candidate > rec[[nr, nc]] {
                rec[[nr, nc]] = candidate;
                heap.push(Queued { value: candidate, seq, row: nr, col: nc });
                seq += 1;
            }
        }
    }

    regional_maxima(&rec, mask)
}

/// Label 8-connected plateaus of `f` that have no higher neighbour.
fn regional_maxima(f: &Array2<f32>, mask: &Array2<bool>) -> Array2<u32> {
    let (h, w) = f.dim();
    let mut labels = Array2::<u32>::zeros((h, w));
    let mut visited = Array2::from_elem((h, w), false);
    let mut next_label = 1u32;
    let mut plateau = Vec::new();
    let mut queue = VecDeque::new();

    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] || visited[[row, col]] {
                continue;
            }
            let level = f[[row, col]];
            let mut is_max = true;
            plateau.clear();
            visited[[row, col]] = true;
            queue.push_back((row, col));

            while let Some((r, c)) = queue.pop_front() {
                plateau.push((r, c));
                for (nr, nc) in neighbours_8(r, c, h, w) {
                    let value = f[[nr, nc]];
                    if value > level {
                        is_max = false;
                    } else if value == level && mask[[nr, nc]] && !visited[[nr, nc]] {
                        visited[[nr, nc]] = true;
                        queue.push_back((nr, nc));
                    }
                }
            }

            if is_max {
                for &(r, c) in &plateau {
                    labels[[r, c]] = next_label;
                }
                next_label += 1;
            }
        }
    }

    labels
}

/// Priority flood from `markers` over `mask`, highest distance first.
///
/// Pixels adjacent to two different basins become watershed lines (label 0).
fn flood(distance: &Array2<f32>, mask: &Array2<bool>, markers: &Array2<u32>) -> Array2<u32> {
    let (h, w) = distance.dim();
    let mut labels = markers.clone();
    let mut queued = markers.mapv(|m| m != 0);
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;

    for ((row, col), &m) in markers.indexed_iter() {
        if m == 0 {
            continue;
        }
        for (nr, nc) in neighbours_8(row, col, h, w) {
            if mask[[nr, nc]] && !queued[[nr, nc]] {
                queued[[nr, nc]] = true;
                heap.push(Queued { value: distance[[nr, nc]], seq, row: nr, col: nc });
                seq += 1;
            }
        }
    }

    while let Some(Queued { row, col, .. }) = heap.pop() {
        let mut basin = 0u32;
        let mut is_line = false;
        for (nr, nc) in neighbours_8(row, col, h, w) {
            let l = labels[[nr, nc]];
            if l == 0 {
                continue;
            }
            if basin == 0 {
                basin = l;
            } else if l != basin {
                is_line = true;
                break;
            }
        }
        if is_line || basin == 0 {
            continue;
        }
        labels[[row, col]] = basin;
        for (nr, nc) in neighbours_8(row, col, h, w) {
            if mask[[nr, nc]] && !queued[[nr, nc]] {
                queued[[nr, nc]] = true;
                heap.push(Queued { value: distance[[nr, nc]], seq, row: nr, col: nc });
                seq += 1;
            }
        }
    }

    labels
}
