#[allow(dead_code)]
mod common;

use ndarray::{Array2, Array3};

use nucspot_core::detection::{segment_nuclei, NucleusConfig};

fn rect_plane(h: usize, w: usize, rects: &[(usize, usize, usize, usize)]) -> Array2<f32> {
    let mut plane = Array2::from_elem((h, w), 100.0f32);
    for &(r0, c0, rh, cw) in rects {
        for r in r0..r0 + rh {
            for c in c0..c0 + cw {
                plane[[r, c]] = 2000.0;
            }
        }
    }
    plane
}

#[test]
fn test_counts_separate_nuclei() {
    let volume = common::nucleus_volume();
    let seg = segment_nuclei(&volume.view(), &NucleusConfig::default());
    assert_eq!(seg.count, 2);
    assert_eq!(seg.projection.dim(), (48, 48));
    assert_eq!(seg.labels.iter().cloned().max(), Some(2));
    assert_ne!(seg.labels[[12, 12]], 0);
    assert_ne!(seg.labels[[35, 35]], seg.labels[[12, 12]]);
}

#[test]
fn test_projection_uses_brightest_slice() {
    // Nuclei only present in one slice of five.
    let plane = common::disk_plane(48, 48, &[(12.0, 12.0, 9.0), (35.0, 35.0, 9.0)], 100.0, 2000.0);
    let mut volume = Array3::from_elem((5, 48, 48), 100.0f32);
    volume.index_axis_mut(ndarray::Axis(0), 3).assign(&plane);

    let seg = segment_nuclei(&volume.view(), &NucleusConfig::default());
    assert_eq!(seg.count, 2);
    assert_eq!(seg.projection, plane);
}

#[test]
fn test_touching_nuclei_are_split() {
    let plane = common::disk_plane(48, 64, &[(24.0, 22.0, 12.0), (24.0, 42.0, 12.0)], 100.0, 2000.0);
    let volume = common::repeat_plane(&plane, 3);
    let seg = segment_nuclei(&volume.view(), &NucleusConfig::default());
    assert_eq!(seg.count, 2);
}

#[test]
fn test_area_boundary() {
    // 9x11 = 99 pixels and 10x10 = 100 pixels.
    let plane = rect_plane(40, 40, &[(3, 3, 9, 11), (22, 22, 10, 10)]);
    let volume = common::repeat_plane(&plane, 2);
    let config = NucleusConfig {
        closing_radius: 0,
        ..Default::default()
    };

    let seg = segment_nuclei(&volume.view(), &config);
    assert_eq!(seg.count, 1);
    assert_eq!(seg.labels[[5, 5]], 0);
    assert_eq!(seg.labels[[25, 25]], 1);

    let relaxed = NucleusConfig {
        min_area: 99,
        ..config
    };
    assert_eq!(segment_nuclei(&volume.view(), &relaxed).count, 2);
}

#[test]
fn test_max_area_filter() {
    let volume = common::nucleus_volume();
    let config = NucleusConfig {
        max_area: 50,
        min_area: 1,
        ..Default::default()
    };
    assert_eq!(segment_nuclei(&volume.view(), &config).count, 0);
}

#[test]
fn test_all_black_is_zero() {
    let volume = Array3::<f32>::zeros((4, 32, 32));
    let seg = segment_nuclei(&volume.view(), &NucleusConfig::default());
    assert_eq!(seg.count, 0);
    assert!(seg.labels.iter().all(|&l| l == 0));
}

#[test]
fn test_uniform_image_is_zero() {
    let volume = Array3::from_elem((4, 32, 32), 1234.0f32);
    assert_eq!(segment_nuclei(&volume.view(), &NucleusConfig::default()).count, 0);
}

#[test]
fn test_empty_volume() {
    let volume = Array3::<f32>::zeros((0, 16, 16));
    let seg = segment_nuclei(&volume.view(), &NucleusConfig::default());
    assert_eq!(seg.count, 0);
    assert_eq!(seg.labels.dim(), (16, 16));
}
