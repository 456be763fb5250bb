use ndarray::{Array2, Array3};

/// Statistics for a single 2D connected component.
#[derive(Clone, Debug)]
pub struct ComponentStats {
    /// Label of this component in the returned label image.
    pub label: u32,
    /// Number of pixels in the component.
    pub area: usize,
    /// Bounding box: (min_row, max_row, min_col, max_col).
    pub bbox: (usize, usize, usize, usize),
}

/// Statistics for a single 3D connected object.
#[derive(Clone, Debug)]
pub struct ObjectStats {
    pub label: u32,
    /// Number of voxels in the object.
    pub volume: usize,
    /// Bounding box: (min_z, max_z, min_row, max_row, min_col, max_col).
    pub bbox: (usize, usize, usize, usize, usize, usize),
}

impl ObjectStats {
    /// True if any voxel lies on one of the six faces of a volume of `dim`.
    pub fn touches_border(&self, dim: (usize, usize, usize)) -> bool {
        let (d, h, w) = dim;
        let (z0, z1, r0, r1, c0, c1) = self.bbox;
        z0 == 0 || r0 == 0 || c0 == 0 || z1 + 1 >= d || r1 + 1 >= h || c1 + 1 >= w
    }
}

/// Union-find over provisional labels. Index 0 is background.
struct Equivalences {
    parent: Vec<u32>,
}

impl Equivalences {
    fn new(capacity: usize) -> Self {
        Self {
            parent: vec![0; capacity.max(2)],
        }
    }

    fn make(&mut self, label: u32) {
        if label as usize >= self.parent.len() {
            self.parent.resize(self.parent.len() * 2, 0);
        }
        self.parent[label as usize] = label;
    }

    fn find(&self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            x = self.parent[x as usize];
        }
        x
    }

    fn union(&mut self, a: u32, b: u32) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Merge larger root into smaller root to keep labels consistent.
            let (small, big) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[big as usize] = small;
        }
    }

    /// Map every provisional label to a dense final label in order of
    /// first root occurrence.
    fn flatten(&self, next_label: u32) -> Vec<u32> {
        let mut dense = vec![0u32; next_label as usize];
        let mut count = 0u32;
        for l in 1..next_label {
            let root = self.find(l);
            if root == l {
                count += 1;
                dense[l as usize] = count;
            }
        }
        for l in 1..next_label {
            let root = self.find(l);
            dense[l as usize] = dense[root as usize];
        }
        dense
    }
}

/// Two-pass union-find labeling of a 2D mask with 8-connectivity.
///
/// Returns the label image (0 = background) and one entry per component,
/// indexed by `label - 1`.
pub fn label_components(mask: &Array2<bool>) -> (Array2<u32>, Vec<ComponentStats>) {
    let (h, w) = mask.dim();
    let mut labels = Array2::<u32>::zeros((h, w));
    if h == 0 || w == 0 {
        return (labels, Vec::new());
    }

    let mut eq = Equivalences::new(h * w / 2 + 2);
    let mut next_label = 1u32;

    // Pass 1: provisional labels from already visited neighbours.
    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }
            let mut current = 0u32;
            let prior = [
                (row > 0 && col > 0).then(|| (row - 1, col - 1)),
                (row > 0).then(|| (row - 1, col)),
                (row > 0 && col + 1 < w).then(|| (row - 1, col + 1)),
                (col > 0).then(|| (row, col - 1)),
            ];
            for (r, c) in prior.into_iter().flatten() {
                let l = labels[[r, c]];
                if l == 0 {
                    continue;
                }
                if current == 0 {
                    current = l;
                } else if l != current {
                    eq.union(current, l);
                    current = current.min(l);
                }
            }
            if current == 0 {
                eq.make(next_label);
                current = next_label;
                next_label += 1;
            }
            labels[[row, col]] = current;
        }
    }

    // Pass 2: resolve labels and collect stats.
    let dense = eq.flatten(next_label);
    let mut stats: Vec<ComponentStats> = Vec::new();
    for row in 0..h {
        for col in 0..w {
            let provisional = labels[[row, col]];
            if provisional == 0 {
                continue;
            }
            let label = dense[provisional as usize];
            labels[[row, col]] = label;
            let idx = label as usize - 1;
            if idx == stats.len() {
                stats.push(ComponentStats {
                    label,
                    area: 0,
                    bbox: (row, row, col, col),
                });
            }
            let entry = &mut stats[idx];
            entry.area += 1;
            entry.bbox.0 = entry.bbox.0.min(row);
            entry.bbox.1 = entry.bbox.1.max(row);
            entry.bbox.2 = entry.bbox.2.min(col);
            entry.bbox.3 = entry.bbox.3.max(col);
        }
    }

    (labels, stats)
}

/// Two-pass union-find labeling of a 3D mask with 26-connectivity.
///
/// Returns the label volume (0 = background) and one entry per object,
/// indexed by `label - 1`.
pub fn label_objects(mask: &Array3<bool>) -> (Array3<u32>, Vec<ObjectStats>) {
    let (d, h, w) = mask.dim();
    let mut labels = Array3::<u32>::zeros((d, h, w));
    if d == 0 || h == 0 || w == 0 {
        return (labels, Vec::new());
    }

    let mut eq = Equivalences::new(d * h * w / 4 + 2);
    let mut next_label = 1u32;

    for z in 0..d {
        for row in 0..h {
            for col in 0..w {
                if !mask[[z, row, col]] {
                    continue;
                }
                let mut current = 0u32;
                for (dz, dr, dc) in PRIOR_26 {
                    let nz = z as isize + dz;
                    let nr = row as isize + dr;
                    let nc = col as isize + dc;
                    if nz < 0 || nr < 0 || nc < 0 || nr >= h as isize || nc >= w as isize {
                        continue;
                    }
                    let l = labels[[nz as usize, nr as usize, nc as usize]];
                    if l == 0 {
                        continue;
                    }
                    if current == 0 {
                        current = l;
                    } else if l != current {
                        eq.union(current, l);
                        current = current.min(l);
                    }
                }
                if current == 0 {
                    eq.make(next_label);
                    current = next_label;
                    next_label += 1;
                }
                labels[[z, row, col]] = current;
            }
        }
    }

    let dense = eq.flatten(next_label);
    let mut stats: Vec<ObjectStats> = Vec::new();
    for ((z, row, col), l) in labels.indexed_iter_mut() {
        if *l == 0 {
            continue;
        }
        let label = dense[*l as usize];
        *l = label;
        let idx = label as usize - 1;
        if idx == stats.len() {
            stats.push(ObjectStats {
                label,
                volume: 0,
                bbox: (z, z, row, row, col, col),
            });
        }
        let entry = &mut stats[idx];
        entry.volume += 1;
        let b = &mut entry.bbox;
        b.0 = b.0.min(z);
        b.1 = b.1.max(z);
        b.2 = b.2.min(row);
        b.3 = b.3.max(row);
        b.4 = b.4.min(col);
        b.5 = b.5.max(col);
    }

    (labels, stats)
}

/// The 13 neighbours of the 26-neighbourhood visited before the current
/// voxel in (z, row, col) raster order.
const PRIOR_26: [(isize, isize, isize); 13] = [
    (-1, -1, -1),
    (-1, -1, 0),
    (-1, -1, 1),
    (-1, 0, -1),
    (-1, 0, 0),
    (-1, 0, 1),
    (-1, 1, -1),
    (-1, 1, 0),
    (-1, 1, 1),
    (0, -1, -1),
    (0, -1, 0),
    (0, -1, 1),
    (0, 0, -1),
];

/// Keep components whose label passes `keep`, renumbered 1..=n in label
/// order. Returns the new label image and the number of survivors.
pub fn relabel_2d<F>(labels: &Array2<u32>, stats: &[ComponentStats], keep: F) -> (Array2<u32>, usize)
where
    F: Fn(&ComponentStats) -> bool,
{
    let (remap, count) = survivors(stats.iter().map(keep));
    (labels.mapv(|l| remap[l as usize]), count)
}

/// 3D counterpart of [`relabel_2d`].
pub fn relabel_3d<F>(labels: &Array3<u32>, stats: &[ObjectStats], keep: F) -> (Array3<u32>, usize)
where
    F: Fn(&ObjectStats) -> bool,
{
    let (remap, count) = survivors(stats.iter().map(keep));
    (labels.mapv(|l| remap[l as usize]), count)
}

fn survivors(kept: impl Iterator<Item = bool>) -> (Vec<u32>, usize) {
    let mut remap = vec![0u32];
    let mut count = 0u32;
    for keep in kept {
        if keep {
            count += 1;
            remap.push(count);
        } else {
            remap.push(0);
        }
    }
    (remap, count as usize)
}
