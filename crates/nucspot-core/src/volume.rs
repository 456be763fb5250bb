use std::path::PathBuf;

use ndarray::{Array2, Array4, ArrayView3, Axis};

use crate::error::{NucspotError, Result};

/// A multi-channel 3D image, axis order (channel, z, y, x).
///
/// Sample values keep the units of the source file (e.g. 0..65535 for
/// 16-bit data); nothing is normalized on load.
#[derive(Clone, Debug)]
pub struct ImageStack {
    pub data: Array4<f32>,
    pub metadata: StackMetadata,
}

impl ImageStack {
    pub fn new(data: Array4<f32>, metadata: StackMetadata) -> Self {
        Self { data, metadata }
    }

    pub fn channel_count(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn depth(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    /// Borrow one channel as a (z, y, x) volume.
    pub fn channel(&self, index: usize) -> Result<ArrayView3<'_, f32>> {
        let total = self.channel_count();
        if index >= total {
            return Err(NucspotError::ChannelOutOfRange { index, total });
        }
        Ok(self.data.index_axis(Axis(0), index))
    }
}

/// Sample type of the source file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SampleType {
    U8,
    I16,
    #[default]
    U16,
    F32,
}

impl SampleType {
    pub fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::F32 => 4,
        }
    }

    pub fn bit_depth(self) -> u8 {
        (self.bytes() * 8) as u8
    }
}

/// Metadata carried alongside the pixel data.
#[derive(Clone, Debug, Default)]
pub struct StackMetadata {
    pub source: PathBuf,
    pub sample_type: SampleType,
    /// Physical voxel size (x, y, z) in microns, when the file records it.
    pub voxel_size: Option<[f32; 3]>,
}

/// Maximum-intensity projection of a (z, y, x) volume along z.
pub fn max_projection(volume: &ArrayView3<f32>) -> Array2<f32> {
    volume.fold_axis(Axis(0), f32::NEG_INFINITY, |&acc, &v| acc.max(v))
}

/// Maximum projection of a label volume along z.
pub fn max_projection_labels(labels: &ArrayView3<u32>) -> Array2<u32> {
    labels.fold_axis(Axis(0), 0, |&acc, &v| acc.max(v))
}
