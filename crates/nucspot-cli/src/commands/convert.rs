use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use nucspot_core::io::tiff_stack::convert_directory;

#[derive(Args)]
pub struct ConvertArgs {
    /// Folder containing ND2 or DV stacks
    pub input: PathBuf,

    /// Output folder (default: <input>/converted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &ConvertArgs) -> Result<()> {
    let report = convert_directory(&args.input, args.output.as_deref(), |file| {
        println!("Converting {}", file.display());
    })
    .with_context(|| format!("Failed to convert stacks in {}", args.input.display()))?;

    println!(
        "\n{} file(s) written to {}",
        report.converted.len(),
        report.output_dir.display()
    );

    if !report.failed.is_empty() {
        for (path, reason) in &report.failed {
            eprintln!("  {}: {}", path.display(), reason);
        }
        bail!("{} file(s) failed to convert", report.failed.len());
    }

    Ok(())
}
