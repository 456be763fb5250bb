use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use nucspot_core::io::dv::DvReader;
use nucspot_core::io::nd2::{LoopKind, Nd2Reader};
use nucspot_core::io::StackFormat;

#[derive(Args)]
pub struct InfoArgs {
    /// Input DV or ND2 file
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    match StackFormat::from_path(&args.file) {
        Some(StackFormat::Dv) => print_dv(&args.file),
        Some(StackFormat::Nd2) => print_nd2(&args.file),
        None => bail!("{} is neither a .dv nor an .nd2 file", args.file.display()),
    }
}

fn print_dv(path: &Path) -> Result<()> {
    let reader =
        DvReader::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let header = &reader.header;

    println!("File:        {}", path.display());
    println!("Format:      DeltaVision");
    println!(
        "Dimensions:  {}x{}x{} (x, y, z)",
        header.width,
        header.height,
        header.depth()
    );
    println!("Channels:    {}", header.wavelength_count);
    println!("Time points: {}", header.time_points);
    println!("Bit depth:   {}", header.sample_type()?.bit_depth());
    println!("Pixel mode:  {}", header.pixel_mode);
    println!("Sequence:    {:?}", header.sequence);
    println!(
        "Voxel size:  {:.4} x {:.4} x {:.4} um",
        header.voxel_size[0], header.voxel_size[1], header.voxel_size[2]
    );
    println!(
        "Byte order:  {}",
        if header.little_endian { "little-endian" } else { "big-endian" }
    );

    if !header.wavelengths.is_empty() {
        let list: Vec<String> = header.wavelengths.iter().map(|w| format!("{w} nm")).collect();
        println!("Wavelengths: {}", list.join(", "));
    }
    for title in &header.titles {
        println!("Title:       {}", title);
    }

    let data_bytes = header.data_end()? - header.data_offset();
    println!("Data size:   {:.1} MB", data_bytes as f64 / (1024.0 * 1024.0));

    Ok(())
}

fn print_nd2(path: &Path) -> Result<()> {
    let reader =
        Nd2Reader::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let attrs = &reader.attributes;

    println!("File:        {}", path.display());
    println!("Format:      Nikon ND2");
    println!(
        "Dimensions:  {}x{}x{} (x, y, z)",
        attrs.width,
        attrs.height,
        reader.depth()
    );
    println!("Channels:    {}", attrs.components);
    println!("Bit depth:   {}", attrs.bits_per_component);
    println!("Frames:      {}", attrs.sequence_count);

    if !reader.loops.is_empty() {
        let loops: Vec<String> = reader
            .loops
            .iter()
            .map(|l| {
                let kind = match l.kind {
                    LoopKind::Time => "T".to_string(),
                    LoopKind::Position => "XY".to_string(),
                    LoopKind::ZStack => "Z".to_string(),
                    LoopKind::Other(code) => format!("loop {code}"),
                };
                format!("{kind}({})", l.count)
            })
            .collect();
        println!("Loops:       {}", loops.join(" > "));
    }
    if let Some(xy) = reader.calibration {
        println!("Pixel size:  {:.4} um", xy);
    }
    if let Some(step) = reader.z_step() {
        println!("Z step:      {:.4} um", step);
    }

    Ok(())
}
