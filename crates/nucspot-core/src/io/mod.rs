pub mod discovery;
pub mod dv;
pub mod image_io;
pub mod loader;
pub mod nd2;
pub mod tiff_stack;

pub use discovery::{discover_experiments, Experiment};
pub use loader::{DvLoader, Nd2Loader, StackFormat, StackLoader};
