pub mod analyze;
pub mod config;
pub mod convert;
pub mod info;
