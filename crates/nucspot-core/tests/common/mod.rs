use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3, Array4};
use nucspot_core::io::dv::{DV_HEADER_SIZE, DV_MAGIC};
use nucspot_core::io::nd2::{ND2_CHUNK_MAGIC, ND2_CHUNK_MAP_SIGNATURE, ND2_FILE_SIGNATURE};
use nucspot_core::volume::{ImageStack, SampleType, StackMetadata};

/// Build a 1024-byte DeltaVision header.
///
/// `sequence`: 0=ZTW, 1=WZT, 2=ZWT. `pixel_mode`: 0=u8, 1=i16, 2=f32, 6=u16.
pub fn build_dv_header(
    width: usize,
    height: usize,
    depth: usize,
    channels: usize,
    pixel_mode: i32,
    sequence: i16,
    little_endian: bool,
) -> Vec<u8> {
    let mut buf = vec![0u8; DV_HEADER_SIZE];
    let put_i32 = |buf: &mut Vec<u8>, off: usize, v: i32| {
        let bytes = if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
        buf[off..off + 4].copy_from_slice(&bytes);
    };
    let put_i16 = |buf: &mut Vec<u8>, off: usize, v: i16| {
        let bytes = if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
        buf[off..off + 2].copy_from_slice(&bytes);
    };
    let put_f32 = |buf: &mut Vec<u8>, off: usize, v: f32| {
        let bytes = if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
        buf[off..off + 4].copy_from_slice(&bytes);
    };

    put_i32(&mut buf, 0, width as i32);
    put_i32(&mut buf, 4, height as i32);
    put_i32(&mut buf, 8, (depth * channels) as i32);
    put_i32(&mut buf, 12, pixel_mode);
    // Pixel size (x, y, z) in microns
    put_f32(&mut buf, 40, 0.1);
    put_f32(&mut buf, 44, 0.1);
    put_f32(&mut buf, 48, 0.3);
    // No extended header
    put_i32(&mut buf, 92, 0);
    put_i16(&mut buf, 96, DV_MAGIC);
    // One time point
    put_i16(&mut buf, 180, 1);
    put_i16(&mut buf, 182, sequence);
    put_i16(&mut buf, 196, channels as i16);
    for c in 0..channels.min(5) {
        put_i16(&mut buf, 198 + 2 * c, 450 + 100 * c as i16);
    }

    assert_eq!(buf.len(), DV_HEADER_SIZE);
    buf
}

/// Build a complete little-endian u16 ZTW DeltaVision file, one (z, y, x)
/// volume per channel.
pub fn build_dv(channels: &[Array3<f32>]) -> Vec<u8> {
    let (d, h, w) = channels[0].dim();
    let mut buf = build_dv_header(w, h, d, channels.len(), 6, 0, true);
    // ZTW with a single time point: channel-major, then z.
    for volume in channels {
        for &v in volume.iter() {
            let sample = v.round().clamp(0.0, u16::MAX as f32) as u16;
            buf.extend_from_slice(&sample.to_le_bytes());
        }
    }
    buf
}

/// Write a two-or-more channel DV file into `dir`.
pub fn write_dv(dir: &Path, name: &str, channels: &[Array3<f32>]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, build_dv(channels)).unwrap();
    path
}

/// (z, y, x) volume with the same 2D plane at every depth.
pub fn repeat_plane(plane: &Array2<f32>, depth: usize) -> Array3<f32> {
    let (h, w) = plane.dim();
    Array3::from_shape_fn((depth, h, w), |(_, r, c)| plane[[r, c]])
}

/// Plane of `background` with filled disks of `foreground`.
///
/// Each disk is (center_row, center_col, radius).
pub fn disk_plane(
    height: usize,
    width: usize,
    disks: &[(f32, f32, f32)],
    background: f32,
    foreground: f32,
) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |(r, c)| {
        let inside = disks.iter().any(|&(cr, cc, radius)| {
            let dr = r as f32 - cr;
            let dc = c as f32 - cc;
            dr * dr + dc * dc <= radius * radius
        });
        if inside {
            foreground
        } else {
            background
        }
    })
}

/// Zero volume with anisotropic Gaussian blobs at integer centers (z, y, x).
pub fn blob_volume(
    dim: (usize, usize, usize),
    centers: &[(usize, usize, usize)],
    amplitude: f32,
    sigma_xy: f32,
    sigma_z: f32,
) -> Array3<f32> {
    Array3::from_shape_fn(dim, |(z, r, c)| {
        centers
            .iter()
            .map(|&(cz, cr, cc)| {
                let dz = z as f32 - cz as f32;
                let dr = r as f32 - cr as f32;
                let dc = c as f32 - cc as f32;
                let e = (dr * dr + dc * dc) / (2.0 * sigma_xy * sigma_xy)
                    + dz * dz / (2.0 * sigma_z * sigma_z);
                amplitude * (-e).exp()
            })
            .sum()
    })
}

/// Volume size used for spot tests: (z, y, x).
pub const SPOT_DIM: (usize, usize, usize) = (24, 48, 48);

/// Three interior blobs.
pub const INTERIOR_SPOTS: [(usize, usize, usize); 3] = [(12, 12, 12), (12, 12, 36), (12, 36, 24)];

/// One blob centered on the x = 0 face.
pub const BORDER_SPOT: (usize, usize, usize) = (12, 30, 0);

/// Three interior blobs and one blob cut by the volume border.
pub fn spot_volume() -> Array3<f32> {
    let mut centers = INTERIOR_SPOTS.to_vec();
    centers.push(BORDER_SPOT);
    blob_volume(SPOT_DIM, &centers, 1000.0, 2.0, 2.5)
}

/// Nucleus channel matching `SPOT_DIM` with two well separated nuclei.
pub fn nucleus_volume() -> Array3<f32> {
    let (d, h, w) = SPOT_DIM;
    let plane = disk_plane(h, w, &[(12.0, 12.0, 9.0), (35.0, 35.0, 9.0)], 100.0, 2000.0);
    repeat_plane(&plane, d)
}

/// In-memory stack from per-channel volumes.
pub fn stack_from(channels: &[Array3<f32>]) -> ImageStack {
    let (d, h, w) = channels[0].dim();
    let data = Array4::from_shape_fn((channels.len(), d, h, w), |(c, z, r, col)| {
        channels[c][[z, r, col]]
    });
    ImageStack::new(
        data,
        StackMetadata {
            sample_type: SampleType::U16,
            ..Default::default()
        },
    )
}

// ---------------------------------------------------------------------------
// ND2
// ---------------------------------------------------------------------------

/// ND2 loop type codes.
pub const ND2_LOOP_TIME: u32 = 1;
pub const ND2_LOOP_POSITION: u32 = 2;
pub const ND2_LOOP_Z: u32 = 4;

/// Row padding written after each frame row.
pub const ND2_ROW_PADDING: usize = 4;

/// LV metadata item.
pub enum Lv {
    U32(&'static str, u32),
    F64(&'static str, f64),
    Level(&'static str, Vec<Lv>),
}

fn lv_header(buf: &mut Vec<u8>, kind: u8, name: &str) {
    buf.push(kind);
    let units: Vec<u16> = name.encode_utf16().chain([0]).collect();
    buf.push(units.len() as u8);
    for unit in units {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
}

fn encode_lv_item(buf: &mut Vec<u8>, item: &Lv) {
    let start = buf.len();
    match item {
        Lv::U32(name, v) => {
            lv_header(buf, 3, name);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Lv::F64(name, v) => {
            lv_header(buf, 6, name);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Lv::Level(name, children) => {
            lv_header(buf, 11, name);
            buf.extend_from_slice(&(children.len() as u32).to_le_bytes());
            let length_at = buf.len();
            buf.extend_from_slice(&0u64.to_le_bytes());
            for child in children {
                encode_lv_item(buf, child);
            }
            let length = (buf.len() - start) as u64;
            buf[length_at..length_at + 8].copy_from_slice(&length.to_le_bytes());
            buf.extend(std::iter::repeat(0u8).take(children.len() * 8));
        }
    }
}

/// Encode top-level LV items.
pub fn encode_lv(items: &[Lv]) -> Vec<u8> {
    let mut buf = Vec::new();
    for item in items {
        encode_lv_item(&mut buf, item);
    }
    buf
}

/// Attributes of an uncompressed 16-bit file with padded rows.
pub fn nd2_attributes(width: usize, height: usize, channels: usize, frames: usize) -> Lv {
    Lv::Level(
        "SLxImageAttributes",
        vec![
            Lv::U32("uiWidth", width as u32),
            Lv::U32("uiWidthBytes", (width * channels * 2 + ND2_ROW_PADDING) as u32),
            Lv::U32("uiHeight", height as u32),
            Lv::U32("uiComp", channels as u32),
            Lv::U32("uiBpcInMemory", 16),
            Lv::U32("uiBpcSignificant", 16),
            Lv::U32("uiSequenceCount", frames as u32),
            Lv::U32("eCompression", 2),
        ],
    )
}

fn experiment_level(name: &'static str, loops: &[(u32, usize)]) -> Lv {
    let (code, count) = loops[0];
    let mut children = vec![
        Lv::U32("uiLoopType", code),
        Lv::Level(
            "uLoopPars",
            vec![Lv::U32("uiCount", count as u32), Lv::F64("dZStep", 0.5)],
        ),
    ];
    if loops.len() > 1 {
        children.push(Lv::Level(
            "ppNextLevelEx",
            vec![experiment_level("i0000000000", &loops[1..])],
        ));
    }
    Lv::Level(name, children)
}

/// Nested experiment for `(loop type, count)` pairs, outermost first.
pub fn nd2_experiment(loops: &[(u32, usize)]) -> Option<Lv> {
    (!loops.is_empty()).then(|| experiment_level("SLxExperiment", loops))
}

fn push_chunk(file: &mut Vec<u8>, map: &mut Vec<(Vec<u8>, u64, u64)>, name: &[u8], data: &[u8]) {
    let pos = file.len() as u64;
    file.extend_from_slice(&ND2_CHUNK_MAGIC.to_le_bytes());
    file.extend_from_slice(&(name.len() as u32).to_le_bytes());
    file.extend_from_slice(&(data.len() as u64).to_le_bytes());
    file.extend_from_slice(name);
    file.extend_from_slice(data);
    map.push((name.to_vec(), pos, data.len() as u64));
}

/// Assemble a chunked ND2 file. Each frame is raw pixel bytes without the
/// timestamp.
pub fn nd2_file(attributes: Lv, experiment: Option<Lv>, frames: &[Vec<u8>]) -> Vec<u8> {
    let mut file = Vec::new();
    let mut map = Vec::new();
    push_chunk(&mut file, &mut map, ND2_FILE_SIGNATURE, b"Ver3.0");
    push_chunk(
        &mut file,
        &mut map,
        b"ImageAttributesLV!",
        &encode_lv(&[attributes]),
    );
    if let Some(experiment) = experiment {
        push_chunk(&mut file, &mut map, b"ImageMetadataLV!", &encode_lv(&[experiment]));
    }
    push_chunk(
        &mut file,
        &mut map,
        b"ImageCalibrationLV!",
        &encode_lv(&[Lv::Level("SLxCalibration", vec![Lv::F64("dCalibration", 0.1)])]),
    );
    for (i, frame) in frames.iter().enumerate() {
        let mut data = 0f64.to_le_bytes().to_vec();
        data.extend_from_slice(frame);
        push_chunk(&mut file, &mut map, format!("ImageDataSeq|{i}!").as_bytes(), &data);
    }

    let mut map_data = Vec::new();
    for (name, pos, size) in &map {
        map_data.extend_from_slice(name);
        map_data.extend_from_slice(&pos.to_le_bytes());
        map_data.extend_from_slice(&size.to_le_bytes());
    }
    map_data.extend_from_slice(ND2_CHUNK_MAP_SIGNATURE);
    let map_pos = file.len() as u64;
    let mut ignored = Vec::new();
    push_chunk(&mut file, &mut ignored, b"ND2 FILEMAP SIGNATURE NAME 0001!", &map_data);

    file.extend_from_slice(ND2_CHUNK_MAP_SIGNATURE);
    file.extend_from_slice(&map_pos.to_le_bytes());
    file
}

/// 16-bit ND2 file whose frames follow `loops` (outermost first).
///
/// `value(frame, channel, row, col)` gives each sample.
pub fn build_nd2(
    width: usize,
    height: usize,
    channels: usize,
    loops: &[(u32, usize)],
    value: impl Fn(usize, usize, usize, usize) -> u16,
) -> Vec<u8> {
    let count: usize = loops.iter().map(|&(_, n)| n).product();
    let frames: Vec<Vec<u8>> = (0..count)
        .map(|f| {
            let mut frame = Vec::new();
            for row in 0..height {
                for col in 0..width {
                    for c in 0..channels {
                        frame.extend_from_slice(&value(f, c, row, col).to_le_bytes());
                    }
                }
                frame.extend(std::iter::repeat(0u8).take(ND2_ROW_PADDING));
            }
            frame
        })
        .collect();
    nd2_file(
        nd2_attributes(width, height, channels, count),
        nd2_experiment(loops),
        &frames,
    )
}

/// Write a single time point ND2 file, one (z, y, x) volume per channel.
pub fn write_nd2(dir: &Path, name: &str, channels: &[Array3<f32>]) -> PathBuf {
    let (d, h, w) = channels[0].dim();
    let bytes = build_nd2(w, h, channels.len(), &[(ND2_LOOP_Z, d)], |z, c, r, col| {
        channels[c][[z, r, col]].round().clamp(0.0, u16::MAX as f32) as u16
    });
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
