use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NucspotError, Result};

/// One experiment folder and the stack files found in it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Experiment {
    /// Folder name, used as the experiment identifier.
    pub name: String,
    /// 0-based position in discovery order.
    pub index: usize,
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Find experiment folders under `root`, each with its stack files.
///
/// Subdirectories are taken in lexical order of their names and indexed
/// 0, 1, 2, ... regardless of how many files they hold. Files whose
/// extension matches one of `extensions` (case-insensitive) are listed in
/// lexical order.
pub fn discover_experiments(root: &Path, extensions: &[&str]) -> Result<Vec<Experiment>> {
    if !root.is_dir() {
        return Err(NucspotError::MissingDirectory(root.to_path_buf()));
    }

    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    dirs.into_iter()
        .enumerate()
        .map(|(index, dir)| {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let files = list_stack_files(&dir, extensions)?;
            Ok(Experiment {
                name,
                index,
                dir,
                files,
            })
        })
        .collect()
}

/// Regular files in `dir` with a matching extension, sorted by path.
pub fn list_stack_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_extension(p, extensions))
        .collect();
    files.sort();
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}
