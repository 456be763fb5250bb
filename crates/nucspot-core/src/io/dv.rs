use std::fs::File;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use memmap2::Mmap;
use ndarray::{Array2, Array4};
use num_traits::AsPrimitive;

use crate::error::{NucspotError, Result};
use crate::volume::{ImageStack, SampleType, StackMetadata};

pub const DV_HEADER_SIZE: usize = 1024;
/// Value of the `dvid` field when read with the file's own byte order.
pub const DV_MAGIC: i16 = -16224; // 0xC0A0

const MAX_WAVELENGTHS: usize = 5;
const TITLE_LEN: usize = 80;
const MAX_TITLES: usize = 10;

/// Order in which sections are stored on disk, fastest-varying axis first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSequence {
    Ztw,
    Wzt,
    Zwt,
}

impl ImageSequence {
    fn from_code(code: i16) -> Result<Self> {
        match code {
            0 => Ok(Self::Ztw),
            1 => Ok(Self::Wzt),
            2 => Ok(Self::Zwt),
            other => Err(NucspotError::InvalidStack(format!(
                "unknown image sequence {other}"
            ))),
        }
    }
}

/// Parsed DeltaVision header.
#[derive(Clone, Debug)]
pub struct DvHeader {
    pub little_endian: bool,
    pub width: usize,
    pub height: usize,
    /// Total number of 2D sections (z * wavelengths * time points).
    pub sections: usize,
    pub pixel_mode: i32,
    pub voxel_size: [f32; 3],
    pub extended_header_size: usize,
    pub time_points: usize,
    pub sequence: ImageSequence,
    pub wavelength_count: usize,
    pub wavelengths: Vec<u16>,
    pub titles: Vec<String>,
}

impl DvHeader {
    pub fn sample_type(&self) -> Result<SampleType> {
        match self.pixel_mode {
            0 => Ok(SampleType::U8),
            1 => Ok(SampleType::I16),
            2 => Ok(SampleType::F32),
            6 => Ok(SampleType::U16),
            other => Err(NucspotError::UnsupportedPixelMode(other)),
        }
    }

    pub fn bytes_per_sample(&self) -> Result<usize> {
        Ok(self.sample_type()?.bytes())
    }

    pub fn depth(&self) -> usize {
        self.sections / (self.wavelength_count * self.time_points)
    }

    pub fn plane_byte_size(&self) -> Result<usize> {
        let bytes = self.bytes_per_sample()?;
        self.width
            .checked_mul(self.height)
            .and_then(|n| n.checked_mul(bytes))
            .ok_or_else(|| {
                NucspotError::InvalidStack(format!(
                    "plane size {}x{} overflows",
                    self.width, self.height
                ))
            })
    }

    /// Byte offset just past the last section.
    pub fn data_end(&self) -> Result<usize> {
        self.plane_byte_size()?
            .checked_mul(self.sections)
            .and_then(|n| n.checked_add(self.data_offset()))
            .ok_or_else(|| {
                NucspotError::InvalidStack(format!(
                    "{} sections of {}x{} overflow the addressable size",
                    self.sections, self.width, self.height
                ))
            })
    }

    pub fn data_offset(&self) -> usize {
        DV_HEADER_SIZE + self.extended_header_size
    }

    /// On-disk section index of plane (z, w, t).
    pub fn section_index(&self, z: usize, w: usize, t: usize) -> usize {
        let nz = self.depth();
        let nw = self.wavelength_count;
        let nt = self.time_points;
        match self.sequence {
            ImageSequence::Ztw => z + nz * (t + nt * w),
            ImageSequence::Wzt => w + nw * (z + nz * t),
            ImageSequence::Zwt => z + nz * (w + nw * t),
        }
    }
}

/// Memory-mapped DeltaVision stack reader.
pub struct DvReader {
    mmap: Mmap,
    pub header: DvHeader,
}

impl DvReader {
    /// Open a DV file and parse its header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < DV_HEADER_SIZE {
            return Err(NucspotError::InvalidStack(
                "file too small for a DeltaVision header".into(),
            ));
        }

        let head = &mmap[..DV_HEADER_SIZE];
        let header = if LittleEndian::read_i16(&head[96..98]) == DV_MAGIC {
            parse_header::<LittleEndian>(head, true)?
        } else if BigEndian::read_i16(&head[96..98]) == DV_MAGIC {
            parse_header::<BigEndian>(head, false)?
        } else {
            return Err(NucspotError::InvalidStack(
                "missing DeltaVision magic".into(),
            ));
        };

        let expected = header.data_end()?;
        if mmap.len() < expected {
            return Err(NucspotError::InvalidStack(format!(
                "file truncated: expected at least {} bytes, got {}",
                expected,
                mmap.len()
            )));
        }

        Ok(Self { mmap, header })
    }

    /// Raw bytes of one on-disk section (zero-copy from mmap).
    fn section_raw(&self, section: usize) -> Result<&[u8]> {
        let size = self.header.plane_byte_size()?;
        let offset = self.header.data_offset() + section * size;
        Ok(&self.mmap[offset..offset + size])
    }

    /// Read plane (z, w, t) as f32 samples in source units.
    pub fn read_plane(&self, z: usize, w: usize, t: usize) -> Result<Array2<f32>> {
        let h = &self.header;
        if z >= h.depth() || w >= h.wavelength_count || t >= h.time_points {
            return Err(NucspotError::InvalidStack(format!(
                "plane (z={z}, w={w}, t={t}) outside {}x{}x{}",
                h.depth(),
                h.wavelength_count,
                h.time_points
            )));
        }
        let raw = self.section_raw(h.section_index(z, w, t))?;
        if h.little_endian {
            decode_plane::<LittleEndian>(raw, h.pixel_mode, h.height, h.width)
        } else {
            decode_plane::<BigEndian>(raw, h.pixel_mode, h.height, h.width)
        }
    }

    /// Load the first time point as a (channel, z, y, x) stack.
    pub fn read_stack(&self, source: &Path) -> Result<ImageStack> {
        let h = &self.header;
        let (nc, nz) = (h.wavelength_count, h.depth());
        let mut data = Array4::<f32>::zeros((nc, nz, h.height, h.width));

        for c in 0..nc {
            for z in 0..nz {
                let plane = self.read_plane(z, c, 0)?;
                data.slice_mut(ndarray::s![c, z, .., ..]).assign(&plane);
            }
        }

        let metadata = StackMetadata {
            source: source.to_path_buf(),
            sample_type: h.sample_type()?,
            voxel_size: Some(h.voxel_size),
        };
        Ok(ImageStack::new(data, metadata))
    }
}

fn parse_header<B: ByteOrder>(buf: &[u8], little_endian: bool) -> Result<DvHeader> {
    let i32_at = |off: usize| B::read_i32(&buf[off..off + 4]);
    let i16_at = |off: usize| B::read_i16(&buf[off..off + 2]);
    let f32_at = |off: usize| B::read_f32(&buf[off..off + 4]);

    let width = i32_at(0);
    let height = i32_at(4);
    let sections = i32_at(8);
    let pixel_mode = i32_at(12);
    let extended_header_size = i32_at(92);

    if width <= 0 || height <= 0 || sections < 0 || extended_header_size < 0 {
        return Err(NucspotError::InvalidStack(format!(
            "invalid dimensions {width}x{height}x{sections}"
        )));
    }

    let time_points = i16_at(180).max(1) as usize;
    let sequence = ImageSequence::from_code(i16_at(182))?;
    let wavelength_count = i16_at(196).max(1) as usize;

    if sections as usize % (wavelength_count * time_points) != 0 {
        return Err(NucspotError::InvalidStack(format!(
            "{sections} sections do not divide into {wavelength_count} wavelengths x {time_points} time points"
        )));
    }

    let wavelengths = (0..wavelength_count.min(MAX_WAVELENGTHS))
        .map(|i| i16_at(198 + 2 * i).max(0) as u16)
        .collect();

    let title_count = (i32_at(220).max(0) as usize).min(MAX_TITLES);
    let titles = (0..title_count)
        .map(|i| read_fixed_string(&buf[224 + i * TITLE_LEN..224 + (i + 1) * TITLE_LEN]))
        .filter(|s| !s.is_empty())
        .collect();

    let header = DvHeader {
        little_endian,
        width: width as usize,
        height: height as usize,
        sections: sections as usize,
        pixel_mode,
        voxel_size: [f32_at(40), f32_at(44), f32_at(48)],
        extended_header_size: extended_header_size as usize,
        time_points,
        sequence,
        wavelength_count,
        wavelengths,
        titles,
    };
    header.sample_type()?;
    Ok(header)
}

fn read_fixed_string(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

fn decode_plane<B: ByteOrder>(
    raw: &[u8],
    pixel_mode: i32,
    height: usize,
    width: usize,
) -> Result<Array2<f32>> {
    let mut data = Array2::<f32>::zeros((height, width));
    let out = data
        .as_slice_mut()
        .ok_or_else(|| NucspotError::InvalidStack("non-contiguous plane buffer".into()))?;

    match pixel_mode {
        0 => widen(raw, 1, out, |b| b[0]),
        1 => widen(raw, 2, out, B::read_i16),
        2 => widen(raw, 4, out, B::read_f32),
        6 => widen(raw, 2, out, B::read_u16),
        other => return Err(NucspotError::UnsupportedPixelMode(other)),
    }

    Ok(data)
}

fn widen<T, F>(raw: &[u8], sample_size: usize, out: &mut [f32], read: F)
where
    T: AsPrimitive<f32>,
    F: Fn(&[u8]) -> T,
{
    for (dst, chunk) in out.iter_mut().zip(raw.chunks_exact(sample_size)) {
        *dst = read(chunk).as_();
    }
}
