pub mod annotate;
pub mod archive;
pub mod config;
pub mod convert;
pub mod summary;
