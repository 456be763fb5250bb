pub mod consts;
pub mod detection;
pub mod error;
pub mod filters;
pub mod gate;
pub mod io;
pub mod pipeline;
pub mod preview;
pub mod results;
pub mod volume;
