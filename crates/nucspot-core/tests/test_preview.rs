#[allow(dead_code)]
mod common;

use image::Rgb;
use ndarray::{Array2, Array3};
use tempfile::TempDir;

use nucspot_core::detection::{NucleusSegmentation, SpotDetection};
use nucspot_core::io::image_io::{preview_path, save_preview};
use nucspot_core::preview::{
    categorical_palette, palette_index, render_nucleus_preview, render_spot_preview, PALETTE_SIZE,
};

#[test]
fn test_palette() {
    let palette = categorical_palette();
    assert_eq!(palette.len(), PALETTE_SIZE);
    assert_eq!(palette[0], Rgb([0, 0, 0]));
    assert!(palette[1..].iter().all(|c| *c != Rgb([0, 0, 0])));
    assert_ne!(palette[1], palette[2]);
    assert_eq!(categorical_palette(), palette);
}

#[test]
fn test_palette_index_range() {
    assert_eq!(palette_index(0, 5), 0);
    assert_eq!(palette_index(3, 0), 0);
    assert_eq!(palette_index(5, 5), PALETTE_SIZE - 1);
    assert_eq!(palette_index(1, 1000), 1);
    assert!(palette_index(2, 5) > palette_index(1, 5));
}

#[test]
fn test_nucleus_preview_outlines() {
    let mut labels = Array2::<u32>::zeros((10, 10));
    for r in 2..8 {
        for c in 2..8 {
            labels[[r, c]] = 1;
        }
    }
    let projection = labels.mapv(|l| if l > 0 { 500.0 } else { 100.0 });
    let seg = NucleusSegmentation {
        count: 1,
        projection,
        labels,
    };

    let img = render_nucleus_preview(&seg);
    assert_eq!(img.dimensions(), (10, 10));
    // Boundary of the nucleus is yellow, its interior and the background gray.
    assert_eq!(*img.get_pixel(2, 2), Rgb([255, 255, 0]));
    assert_eq!(*img.get_pixel(5, 5), Rgb([255, 255, 255]));
    assert_eq!(*img.get_pixel(0, 0), Rgb([0, 0, 0]));
}

#[test]
fn test_spot_preview_colors_by_label() {
    let mut labels = Array3::<u32>::zeros((3, 4, 6));
    labels[[0, 1, 1]] = 1;
    labels[[2, 2, 4]] = 2;
    let spots = SpotDetection { count: 2, labels };

    let img = render_spot_preview(&spots);
    let palette = categorical_palette();
    assert_eq!(img.dimensions(), (6, 4));
    assert_eq!(*img.get_pixel(0, 0), palette[0]);
    assert_eq!(*img.get_pixel(1, 1), palette[palette_index(1, 2)]);
    assert_eq!(*img.get_pixel(4, 2), palette[PALETTE_SIZE - 1]);
}

#[test]
fn test_preview_path_uses_last_extension() {
    let path = preview_path(std::path::Path::new("/data/exp/cell.01.dv"), "_seg");
    assert_eq!(path, std::path::PathBuf::from("/data/exp/cell.01_seg.jpg"));
}

#[test]
fn test_save_preview_writes_jpeg() {
    let tmp = TempDir::new().unwrap();
    let volume = common::nucleus_volume();
    let seg = nucspot_core::detection::segment_nuclei(&volume.view(), &Default::default());
    let path = tmp.path().join("a_seg.jpg");
    save_preview(&render_nucleus_preview(&seg), &path).unwrap();

    let loaded = image::open(&path).unwrap();
    assert_eq!(loaded.width(), 48);
    assert_eq!(loaded.height(), 48);
}
