use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_NUCLEUS_CHANNEL, DEFAULT_SPOT_CHANNEL, SUMMARY_FILE_NAME};
use crate::detection::{NucleusConfig, SpotConfig};
use crate::error::{NucspotError, Result};
use crate::gate::GateConfig;
use crate::io::StackFormat;

/// Everything needed to analyze a root folder of experiments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Folder holding one subfolder per experiment.
    pub root: PathBuf,
    /// Format of the stack files to analyze.
    #[serde(default)]
    pub format: StackFormat,
    #[serde(default)]
    pub channels: ChannelConfig,
    #[serde(default)]
    pub nucleus: NucleusConfig,
    #[serde(default)]
    pub spots: SpotConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AnalysisConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            format: StackFormat::default(),
            channels: ChannelConfig::default(),
            nucleus: NucleusConfig::default(),
            spots: SpotConfig::default(),
            gate: GateConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Reject parameter combinations that cannot produce meaningful counts.
    pub fn validate(&self) -> Result<()> {
        self.channels.validate()?;
        self.nucleus.validate()?;
        self.spots.validate()?;
        self.gate.validate()?;
        if self.output.summary_file.trim().is_empty() {
            return Err(NucspotError::InvalidConfig(
                "summary_file must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Which stack channel feeds which branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_nucleus_channel")]
    pub nuclei: usize,
    #[serde(default = "default_spot_channel")]
    pub spots: usize,
}

fn default_nucleus_channel() -> usize {
    DEFAULT_NUCLEUS_CHANNEL
}
fn default_spot_channel() -> usize {
    DEFAULT_SPOT_CHANNEL
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            nuclei: DEFAULT_NUCLEUS_CHANNEL,
            spots: DEFAULT_SPOT_CHANNEL,
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.nuclei == self.spots {
            return Err(NucspotError::InvalidConfig(format!(
                "nucleus and spot channels are both {}",
                self.nuclei
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write `<stem>_seg.jpg` and `<stem>_spots.jpg` next to each stack.
    #[serde(default = "default_write_previews")]
    pub write_previews: bool,
    /// Summary table file name, written inside the root folder.
    #[serde(default = "default_summary_file")]
    pub summary_file: String,
}

fn default_write_previews() -> bool {
    true
}
fn default_summary_file() -> String {
    SUMMARY_FILE_NAME.to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            write_previews: true,
            summary_file: SUMMARY_FILE_NAME.to_string(),
        }
    }
}
