use std::fs::{self, File};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use ndarray::{s, ArrayView2};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{Rational, TiffEncoder, TiffKind, TiffValue};
use tiff::tags::{ResolutionUnit, Tag};
use tracing::{info, warn};

use crate::consts::DEFAULT_CONVERTED_DIR;
use crate::error::{NucspotError, Result};
use crate::volume::{ImageStack, SampleType};

use super::discovery::list_stack_files;
use super::loader::StackFormat;

/// Outcome of converting a folder of stacks.
#[derive(Clone, Debug, Default)]
pub struct ConversionReport {
    pub output_dir: PathBuf,
    pub converted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Tags written on the first page only.
struct FirstPage<'a> {
    description: &'a str,
    /// Pixels per micron.
    resolution: Option<Rational>,
}

/// Write every plane of `stack` as one page of a BigTIFF, channel-major then
/// z, keeping the source sample type (8/16-bit unsigned, 16-bit signed or
/// 32-bit float).
pub fn write_tiff_stack(stack: &ImageStack, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut encoder = TiffEncoder::new_big(BufWriter::new(file))?;
    let (nc, nz, h, w) = stack.data.dim();
    let voxel_size = stack.metadata.voxel_size;
    let description = imagej_description(nc, nz, voxel_size);
    let resolution = voxel_size
        .map(|[x, _, _]| x)
        .filter(|&x| x > 0.0)
        .map(|x| Rational {
            n: 1_000_000,
            d: (x * 1_000_000.0).round().max(1.0) as u32,
        });

    for c in 0..nc {
        for z in 0..nz {
            let plane = stack.data.slice(s![c, z, .., ..]);
            let first = (c == 0 && z == 0).then(|| FirstPage {
                description: &description,
                resolution: resolution.clone(),
            });
            match stack.metadata.sample_type {
                SampleType::U8 => {
                    let buf = convert_plane(&plane, u8::MIN as f32, u8::MAX as f32, |v| v as u8);
                    write_page::<colortype::Gray8, _, _>(&mut encoder, w, h, &buf, first)?;
                }
                SampleType::I16 => {
                    let buf =
                        convert_plane(&plane, i16::MIN as f32, i16::MAX as f32, |v| v as i16);
                    write_page::<colortype::GrayI16, _, _>(&mut encoder, w, h, &buf, first)?;
                }
                SampleType::U16 => {
                    let buf =
                        convert_plane(&plane, u16::MIN as f32, u16::MAX as f32, |v| v as u16);
                    write_page::<colortype::Gray16, _, _>(&mut encoder, w, h, &buf, first)?;
                }
                SampleType::F32 => {
                    let buf: Vec<f32> = plane.iter().copied().collect();
                    write_page::<colortype::Gray32Float, _, _>(&mut encoder, w, h, &buf, first)?;
                }
            }
        }
    }
    Ok(())
}

/// Round and clamp a plane into the range of an integer sample type.
fn convert_plane<T>(plane: &ArrayView2<f32>, min: f32, max: f32, cast: impl Fn(f32) -> T) -> Vec<T> {
    plane.iter().map(|&v| cast(v.round().clamp(min, max))).collect()
}

fn write_page<C, W, K>(
    encoder: &mut TiffEncoder<W, K>,
    width: usize,
    height: usize,
    data: &[C::Inner],
    first: Option<FirstPage<'_>>,
) -> Result<()>
where
    C: ColorType,
    [C::Inner]: TiffValue,
    W: Write + Seek,
    K: TiffKind,
{
    let mut image = encoder.new_image::<C>(width as u32, height as u32)?;
    if let Some(first) = first {
        image.encoder().write_tag(Tag::ImageDescription, first.description)?;
        if let Some(resolution) = first.resolution {
            image
                .encoder()
                .write_tag(Tag::ResolutionUnit, ResolutionUnit::None.to_u16())?;
            image.encoder().write_tag(Tag::XResolution, resolution.clone())?;
            image.encoder().write_tag(Tag::YResolution, resolution)?;
        }
    }
    image.write_data(data)?;
    Ok(())
}

/// Hyperstack description understood by ImageJ/Fiji.
fn imagej_description(channels: usize, slices: usize, voxel_size: Option<[f32; 3]>) -> String {
    let mut desc = format!(
        "ImageJ=1.11a\nimages={}\nchannels={}\nslices={}\nhyperstack=true\nmode=grayscale\n",
        channels * slices,
        channels,
        slices
    );
    if let Some([_, _, z]) = voxel_size {
        desc.push_str("unit=micron\n");
        if z > 0.0 {
            desc.push_str(&format!("spacing={z}\n"));
        }
    }
    desc
}

/// Convert every `.nd2` and `.dv` file in `input` to `<output>/<stem>.tiff`.
///
/// `output` defaults to `<input>/converted` and is created if missing.
/// Files fail independently; `on_file` is called before each conversion.
pub fn convert_directory<F>(input: &Path, output: Option<&Path>, mut on_file: F) -> Result<ConversionReport>
where
    F: FnMut(&Path),
{
    let output_dir = match output {
        Some(dir) => dir.to_path_buf(),
        None => input.join(DEFAULT_CONVERTED_DIR),
    };
    fs::create_dir_all(&output_dir)?;

    let mut report = ConversionReport {
        output_dir: output_dir.clone(),
        ..Default::default()
    };

    let extensions = StackFormat::ALL.map(StackFormat::extension);
    for source in list_stack_files(input, &extensions)? {
        on_file(&source);
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = output_dir.join(format!("{stem}.tiff"));

        let result = match StackFormat::from_path(&source) {
            Some(format) => format.read_stack(&source),
            None => Err(NucspotError::InvalidStack(format!(
                "unrecognized stack file {}",
                source.display()
            ))),
        }
        .and_then(|stack| write_tiff_stack(&stack, &target));

        match result {
            Ok(()) => {
                info!(source = %source.display(), target = %target.display(), "Converted");
                report.converted.push(target);
            }
            Err(e) => {
                warn!(source = %source.display(), error = %e, "Conversion failed");
                report.failed.push((source, e.to_string()));
            }
        }
    }

    Ok(report)
}
