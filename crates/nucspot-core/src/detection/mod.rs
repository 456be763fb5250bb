pub mod components;
pub mod config;
pub mod morphology;
pub mod nuclei;
pub mod spots;
pub mod threshold;
pub mod watershed;

pub use config::{NucleusConfig, SpotConfig, ThresholdRange};
pub use nuclei::{segment_nuclei, NucleusSegmentation};
pub use spots::{count_spots, detect_spots, enhance_spots, EnhancedVolume, SpotDetection};
