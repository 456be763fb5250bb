//! Nikon ND2 reader (chunked files, version 2.1 and later).
//!
//! An ND2 file is a sequence of chunks. Each chunk starts with a 16-byte
//! header (magic, name length, data length) followed by its name and data.
//! A chunk map at the end of the file gives the position of every chunk.
//! Image attributes and experiment loops are stored as LV variants; every
//! `ImageDataSeq|<n>!` chunk holds one frame of pixel-interleaved channels
//! behind an 8-byte timestamp.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use ndarray::Array4;

use crate::error::{NucspotError, Result};
use crate::volume::{ImageStack, SampleType, StackMetadata};

pub const ND2_CHUNK_MAGIC: u32 = 0x0ABE_CEDA;
pub const ND2_CHUNK_HEADER_SIZE: usize = 16;
pub const ND2_FILE_SIGNATURE: &[u8; 32] = b"ND2 FILE SIGNATURE CHUNK NAME01!";
pub const ND2_CHUNK_MAP_SIGNATURE: &[u8; 32] = b"ND2 CHUNK MAP SIGNATURE 0000001!";
/// Chunk map signature plus the u64 position of the map chunk.
const ND2_TAIL_SIZE: usize = 40;
const FRAME_TIMESTAMP_SIZE: usize = 8;

const ATTRIBUTES_CHUNK: &str = "ImageAttributesLV!";
const METADATA_CHUNK: &str = "ImageMetadataLV!";
const CALIBRATION_CHUNK: &str = "ImageCalibrationLV!";

/// `eCompression` value for uncompressed frames.
const COMPRESSION_NONE: u64 = 2;
const MAX_LV_DEPTH: usize = 32;

fn invalid(msg: impl Into<String>) -> NucspotError {
    NucspotError::InvalidStack(msg.into())
}

fn to_usize(v: u64) -> Result<usize> {
    usize::try_from(v).map_err(|_| invalid(format!("ND2 size {v} out of range")))
}

fn slice_at(buf: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    start
        .checked_add(len)
        .and_then(|end| buf.get(start..end))
        .ok_or_else(|| invalid(format!("ND2 data truncated at byte {start}")))
}

// ---------------------------------------------------------------------------
// LV variants
// ---------------------------------------------------------------------------

/// Decoded LV variant value.
#[derive(Clone, Debug, PartialEq)]
pub enum LvValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Level(Vec<(String, LvValue)>),
}

impl LvValue {
    /// Direct child of a level.
    pub fn get(&self, key: &str) -> Option<&LvValue> {
        match self {
            Self::Level(items) => items.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// First value named `key` anywhere below this one, depth first.
    pub fn find(&self, key: &str) -> Option<&LvValue> {
        let Self::Level(items) = self else {
            return None;
        };
        items.iter().find_map(|(k, v)| {
            if k == key {
                Some(v)
            } else {
                v.find(key)
            }
        })
    }

    fn first_level(&self) -> Option<&LvValue> {
        match self {
            Self::Level(items) => items
                .iter()
                .map(|(_, v)| v)
                .find(|v| matches!(v, Self::Level(_))),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::Bool(b) => Some(b as u64),
            Self::Int(v) => u64::try_from(v).ok(),
            Self::UInt(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Int(v) => Some(v as f64),
            Self::UInt(v) => Some(v as f64),
            Self::Float(v) => Some(v),
            _ => None,
        }
    }
}

struct LvCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> LvCursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = slice_at(self.buf, self.pos, len)?;
        self.pos += len;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// NUL-terminated UTF-16LE string.
    fn utf16z(&mut self) -> Result<String> {
        let mut units = Vec::new();
        loop {
            let unit = LittleEndian::read_u16(self.take(2)?);
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        Ok(String::from_utf16_lossy(&units))
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }
}

/// Decode an LV chunk into a top-level `Level`.
pub fn parse_lv(data: &[u8]) -> Result<LvValue> {
    let mut cursor = LvCursor { buf: data, pos: 0 };
    let mut items = Vec::new();
    while cursor.remaining() > 0 {
        items.push(parse_lv_item(&mut cursor, 0)?);
    }
    Ok(LvValue::Level(items))
}

fn parse_lv_item(cursor: &mut LvCursor<'_>, depth: usize) -> Result<(String, LvValue)> {
    let start = cursor.pos;
    let kind = cursor.u8()?;
    let name_units = cursor.u8()? as usize;
    let name: Vec<u16> = cursor
        .take(name_units * 2)?
        .chunks_exact(2)
        .map(LittleEndian::read_u16)
        .collect();
    let name = String::from_utf16_lossy(&name)
        .trim_end_matches('\0')
        .to_string();

    let value = match kind {
        1 => LvValue::Bool(cursor.u8()? != 0),
        2 => LvValue::Int(cursor.u32()? as i32 as i64),
        3 => LvValue::UInt(cursor.u32()? as u64),
        4 => LvValue::Int(cursor.u64()? as i64),
        5 | 7 => LvValue::UInt(cursor.u64()?),
        6 => LvValue::Float(f64::from_bits(cursor.u64()?)),
        8 => LvValue::Text(cursor.utf16z()?),
        9 => {
            let len = to_usize(cursor.u64()?)?;
            LvValue::Bytes(cursor.take(len)?.to_vec())
        }
        11 => {
            if depth >= MAX_LV_DEPTH {
                return Err(invalid("ND2 metadata nested too deeply"));
            }
            let count = cursor.u32()? as usize;
            let length = to_usize(cursor.u64()?)?;
            // `length` counts from the start of this item and excludes the
            // trailing offset table.
            let end = start
                .checked_add(length)
                .filter(|&end| end >= cursor.pos && end <= cursor.buf.len())
                .ok_or_else(|| invalid(format!("ND2 level '{name}' overruns its chunk")))?;
            let mut inner = LvCursor {
                buf: &cursor.buf[..end],
                pos: cursor.pos,
            };
            let mut items = Vec::new();
            for _ in 0..count {
                items.push(parse_lv_item(&mut inner, depth + 1)?);
            }
            cursor.pos = end;
            let table = count
                .checked_mul(8)
                .ok_or_else(|| invalid("ND2 level offset table overflows"))?;
            cursor.take(table)?;
            LvValue::Level(items)
        }
        other => {
            return Err(invalid(format!(
                "unsupported ND2 variant type {other} for '{name}'"
            )))
        }
    };
    Ok((name, value))
}

// ---------------------------------------------------------------------------
// Attributes and experiment
// ---------------------------------------------------------------------------

/// Frame geometry from `ImageAttributesLV!`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nd2Attributes {
    pub width: usize,
    pub height: usize,
    /// Row stride in bytes, including padding.
    pub width_bytes: usize,
    /// Interleaved channels per pixel.
    pub components: usize,
    pub bits_per_component: usize,
    pub sequence_count: usize,
    pub compression: Option<u64>,
}

impl Nd2Attributes {
    fn from_lv(root: &LvValue) -> Result<Self> {
        let require = |key: &str| -> Result<usize> {
            let value = root
                .find(key)
                .and_then(LvValue::as_u64)
                .ok_or_else(|| invalid(format!("ND2 attributes lack {key}")))?;
            to_usize(value)
        };

        let width = require("uiWidth")?;
        let height = require("uiHeight")?;
        let components = require("uiComp")?;
        let bits_per_component = require("uiBpcInMemory")?;
        let sequence_count = require("uiSequenceCount")?;
        let compression = root.find("eCompression").and_then(LvValue::as_u64);

        if width == 0 || height == 0 || components == 0 {
            return Err(invalid(format!(
                "ND2 frame {width}x{height} with {components} component(s)"
            )));
        }

        let mut attrs = Self {
            width,
            height,
            width_bytes: 0,
            components,
            bits_per_component,
            sequence_count,
            compression,
        };
        let packed = attrs.packed_row_bytes()?;
        attrs.width_bytes = match root.find("uiWidthBytes").and_then(LvValue::as_u64) {
            Some(stride) => to_usize(stride)?,
            None => packed,
        };
        if attrs.width_bytes < packed {
            return Err(invalid(format!(
                "ND2 row stride {} below {} bytes of pixels",
                attrs.width_bytes, packed
            )));
        }
        Ok(attrs)
    }

    pub fn sample_type(&self) -> Result<SampleType> {
        match self.bits_per_component {
            8 => Ok(SampleType::U8),
            16 => Ok(SampleType::U16),
            32 => Ok(SampleType::F32),
            other => Err(invalid(format!("unsupported {other}-bit ND2 samples"))),
        }
    }

    fn packed_row_bytes(&self) -> Result<usize> {
        let bytes = self.sample_type()?.bytes();
        self.width
            .checked_mul(self.components)
            .and_then(|n| n.checked_mul(bytes))
            .ok_or_else(|| invalid(format!("ND2 row of width {} overflows", self.width)))
    }

    /// Pixel bytes per frame, excluding the timestamp.
    pub fn frame_bytes(&self) -> Result<usize> {
        self.height
            .checked_mul(self.width_bytes)
            .ok_or_else(|| invalid(format!("ND2 frame of height {} overflows", self.height)))
    }
}

/// Kind of an experiment loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopKind {
    Time,
    Position,
    ZStack,
    Other(u64),
}

impl LoopKind {
    fn from_code(code: u64) -> Self {
        match code {
            1 | 8 | 9 => Self::Time,
            2 | 3 => Self::Position,
            4 | 10 => Self::ZStack,
            other => Self::Other(other),
        }
    }
}

/// One level of the acquisition, outermost first.
#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentLoop {
    pub kind: LoopKind,
    pub count: usize,
    /// Z step in microns, for z loops that record it.
    pub z_step: Option<f64>,
}

fn parse_experiment(root: &LvValue) -> Result<Vec<ExperimentLoop>> {
    let mut loops = Vec::new();
    let mut level = root.find("SLxExperiment");
    while let Some(exp) = level {
        if loops.len() >= MAX_LV_DEPTH {
            return Err(invalid("ND2 experiment nested too deeply"));
        }
        let Some(code) = exp.get("uiLoopType").and_then(LvValue::as_u64) else {
            break;
        };
        let params = exp.get("uLoopPars");
        let count = params
            .and_then(|p| p.get("uiCount"))
            .and_then(LvValue::as_u64)
            .unwrap_or(1);
        let z_step = params.and_then(|p| p.get("dZStep")).and_then(LvValue::as_f64);
        loops.push(ExperimentLoop {
            kind: LoopKind::from_code(code),
            count: to_usize(count)?.max(1),
            z_step,
        });
        level = exp.get("ppNextLevelEx").and_then(LvValue::first_level);
    }
    Ok(loops)
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Memory-mapped ND2 reader.
pub struct Nd2Reader {
    mmap: Mmap,
    chunks: HashMap<String, usize>,
    pub attributes: Nd2Attributes,
    pub loops: Vec<ExperimentLoop>,
    /// Microns per pixel, when the file is calibrated.
    pub calibration: Option<f64>,
}

impl Nd2Reader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let (name, _) = chunk_at(&mmap, 0)
            .map_err(|_| invalid("not a chunked ND2 file"))?;
        if !name.starts_with(ND2_FILE_SIGNATURE) {
            return Err(invalid("missing ND2 file signature"));
        }

        let chunks = read_chunk_map(&mmap)?;
        let chunk = |key: &str| -> Result<Option<&[u8]>> {
            chunks
                .get(key)
                .map(|&pos| chunk_at(&mmap, pos).map(|(_, data)| data))
                .transpose()
        };

        let attributes = chunk(ATTRIBUTES_CHUNK)?
            .ok_or_else(|| invalid("ND2 file has no image attributes"))
            .and_then(parse_lv)
            .and_then(|lv| Nd2Attributes::from_lv(&lv))?;
        match attributes.compression {
            None | Some(COMPRESSION_NONE) => {}
            Some(_) => return Err(invalid("compressed ND2 frames are not supported")),
        }

        let loops = match chunk(METADATA_CHUNK)? {
            Some(data) => parse_experiment(&parse_lv(data)?)?,
            None => Vec::new(),
        };
        let calibration = match chunk(CALIBRATION_CHUNK)? {
            Some(data) => parse_lv(data)?
                .find("dCalibration")
                .and_then(LvValue::as_f64)
                .filter(|&c| c > 0.0),
            None => None,
        };

        let reader = Self {
            mmap,
            chunks,
            attributes,
            loops,
            calibration,
        };
        let frames = reader.loop_frame_count()?;
        if frames > reader.attributes.sequence_count {
            return Err(invalid(format!(
                "ND2 experiment describes {frames} frames, file holds {}",
                reader.attributes.sequence_count
            )));
        }
        Ok(reader)
    }

    fn loop_frame_count(&self) -> Result<usize> {
        self.loops
            .iter()
            .try_fold(1usize, |acc, l| acc.checked_mul(l.count))
            .ok_or_else(|| invalid("ND2 experiment frame count overflows"))
    }

    fn z_loop(&self) -> Option<usize> {
        self.loops.iter().position(|l| l.kind == LoopKind::ZStack)
    }

    /// Number of z planes; 1 without a z loop.
    pub fn depth(&self) -> usize {
        self.z_loop().map_or(1, |i| self.loops[i].count)
    }

    /// Frames between consecutive z planes of the first time point.
    fn z_stride(&self) -> usize {
        self.z_loop().map_or(1, |i| {
            self.loops[i + 1..].iter().map(|l| l.count).product()
        })
    }

    pub fn z_step(&self) -> Option<f64> {
        self.z_loop().and_then(|i| self.loops[i].z_step)
    }

    /// Pixel bytes of frame `index`.
    pub fn frame(&self, index: usize) -> Result<&[u8]> {
        let key = format!("ImageDataSeq|{index}!");
        let &pos = self
            .chunks
            .get(&key)
            .ok_or_else(|| invalid(format!("ND2 frame {index} missing")))?;
        let (_, data) = chunk_at(&self.mmap, pos)?;
        slice_at(data, FRAME_TIMESTAMP_SIZE, self.attributes.frame_bytes()?)
    }

    /// Load the first time point and position as a (channel, z, y, x) stack.
    pub fn read_stack(&self, source: &Path) -> Result<ImageStack> {
        let attrs = &self.attributes;
        let sample_type = attrs.sample_type()?;
        let bytes = sample_type.bytes();
        let stride = self.z_stride();

        // Frames may share a chunk in a corrupt map; the planes read must
        // still fit in the file.
        self.depth()
            .checked_mul(attrs.frame_bytes()?)
            .filter(|&total| total <= self.mmap.len())
            .ok_or_else(|| {
                invalid(format!(
                    "ND2 stack of {} planes larger than the file",
                    self.depth()
                ))
            })?;

        let frames = (0..self.depth())
            .map(|z| self.frame(z * stride))
            .collect::<Result<Vec<_>>>()?;

        let read: fn(&[u8]) -> f32 = match sample_type {
            SampleType::U8 => |b| b[0] as f32,
            SampleType::I16 => |b| LittleEndian::read_i16(b) as f32,
            SampleType::U16 => |b| LittleEndian::read_u16(b) as f32,
            SampleType::F32 => LittleEndian::read_f32,
        };

        let (nc, w) = (attrs.components, attrs.width);
        let mut data = Array4::<f32>::zeros((nc, frames.len(), attrs.height, w));
        for (z, frame) in frames.iter().enumerate() {
            for (row, line) in frame.chunks_exact(attrs.width_bytes).enumerate() {
                for (col, pixel) in line[..w * nc * bytes].chunks_exact(nc * bytes).enumerate() {
                    for (c, sample) in pixel.chunks_exact(bytes).enumerate() {
                        data[[c, z, row, col]] = read(sample);
                    }
                }
            }
        }

        let voxel_size = self.calibration.map(|xy| {
            let z = self.z_step().unwrap_or(0.0);
            [xy as f32, xy as f32, z as f32]
        });
        let metadata = StackMetadata {
            source: source.to_path_buf(),
            sample_type,
            voxel_size,
        };
        Ok(ImageStack::new(data, metadata))
    }
}

/// Name and data of the chunk whose header starts at `pos`.
fn chunk_at(buf: &[u8], pos: usize) -> Result<(&[u8], &[u8])> {
    let header = slice_at(buf, pos, ND2_CHUNK_HEADER_SIZE)?;
    if LittleEndian::read_u32(&header[..4]) != ND2_CHUNK_MAGIC {
        return Err(invalid(format!("bad ND2 chunk magic at byte {pos}")));
    }
    let name_len = LittleEndian::read_u32(&header[4..8]) as usize;
    let data_len = to_usize(LittleEndian::read_u64(&header[8..16]))?;
    let name_start = pos + ND2_CHUNK_HEADER_SIZE;
    let name = slice_at(buf, name_start, name_len)?;
    let data = slice_at(buf, name_start + name_len, data_len)?;
    Ok((name, data))
}

/// Chunk name to header position, from the map at the end of the file.
fn read_chunk_map(buf: &[u8]) -> Result<HashMap<String, usize>> {
    let tail = buf
        .len()
        .checked_sub(ND2_TAIL_SIZE)
        .ok_or_else(|| invalid("ND2 file too small for a chunk map"))?;
    if &buf[tail..tail + 32] != ND2_CHUNK_MAP_SIGNATURE {
        return Err(invalid("missing ND2 chunk map signature"));
    }
    let map_pos = to_usize(LittleEndian::read_u64(&buf[tail + 32..]))?;
    let (_, data) = chunk_at(buf, map_pos)?;

    let mut map = HashMap::new();
    let mut pos = 0;
    loop {
        let rest = &data[pos.min(data.len())..];
        let name_end = rest
            .iter()
            .position(|&b| b == b'!')
            .ok_or_else(|| invalid("unterminated ND2 chunk map"))?
            + 1;
        let name = &rest[..name_end];
        if name == ND2_CHUNK_MAP_SIGNATURE {
            break;
        }
        // Entry: position then size, both u64; the size is implied by the
        // chunk header.
        let entry = slice_at(rest, name_end, 16)?;
        let position = to_usize(LittleEndian::read_u64(&entry[..8]))?;
        map.insert(String::from_utf8_lossy(name).into_owned(), position);
        pos += name_end + 16;
    }
    Ok(map)
}
