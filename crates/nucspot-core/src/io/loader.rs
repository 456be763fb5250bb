use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NucspotError, Result};
use crate::volume::ImageStack;

use super::dv::DvReader;
use super::nd2::Nd2Reader;

/// Decodes a stack file into channel-separated 3D volumes.
///
/// Implementations must return at least two channels; channel 0 is the
/// nucleus stain and channel 1 the spot stain unless configured otherwise.
pub trait StackLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<ImageStack>;

    /// File extensions (lowercase, no dot) this loader understands.
    fn extensions(&self) -> &[&str];
}

/// Supported microscope stack formats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackFormat {
    /// DeltaVision `.dv`
    #[default]
    Dv,
    /// Nikon `.nd2`
    Nd2,
}

impl StackFormat {
    pub const ALL: [StackFormat; 2] = [StackFormat::Nd2, StackFormat::Dv];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Dv => "dv",
            Self::Nd2 => "nd2",
        }
    }

    /// Format matching the extension of `path`, ignoring case.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }

    /// Read the first time point, whatever its channel count.
    pub fn read_stack(self, path: &Path) -> Result<ImageStack> {
        match self {
            Self::Dv => DvReader::open(path)?.read_stack(path),
            Self::Nd2 => Nd2Reader::open(path)?.read_stack(path),
        }
    }

    /// Loader for analysis input of this format.
    pub fn loader(self) -> &'static dyn StackLoader {
        match self {
            Self::Dv => &DvLoader,
            Self::Nd2 => &Nd2Loader,
        }
    }
}

impl fmt::Display for StackFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for StackFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown stack format '{s}' (expected dv or nd2)"))
    }
}

fn require_two_channels(path: &Path, stack: ImageStack) -> Result<ImageStack> {
    if stack.channel_count() < 2 {
        return Err(NucspotError::InvalidStack(format!(
            "{} has {} channel(s), need at least 2",
            path.display(),
            stack.channel_count()
        )));
    }
    Ok(stack)
}

/// Loader for DeltaVision `.dv` stacks (first time point only).
#[derive(Clone, Copy, Debug, Default)]
pub struct DvLoader;

impl StackLoader for DvLoader {
    fn load(&self, path: &Path) -> Result<ImageStack> {
        require_two_channels(path, StackFormat::Dv.read_stack(path)?)
    }

    fn extensions(&self) -> &[&str] {
        &["dv"]
    }
}

/// Loader for Nikon `.nd2` stacks (first time point and position only).
#[derive(Clone, Copy, Debug, Default)]
pub struct Nd2Loader;

impl StackLoader for Nd2Loader {
    fn load(&self, path: &Path) -> Result<ImageStack> {
        require_two_channels(path, StackFormat::Nd2.read_stack(path)?)
    }

    fn extensions(&self) -> &[&str] {
        &["nd2"]
    }
}
