use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};

use crate::error::Result;

/// Save an 8-bit RGB preview as JPEG.
pub fn save_preview(img: &RgbImage, path: &Path) -> Result<()> {
    img.save_with_format(path, ImageFormat::Jpeg)?;
    Ok(())
}

/// `<dir>/<stem><suffix>.jpg` next to `source`.
pub fn preview_path(source: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}{suffix}.jpg"))
}
