pub mod annotate;
pub mod archive;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod geocode;
pub mod io;
pub mod merge;
pub mod paths;
pub mod reconcile;
pub mod store;
pub mod summary;
pub mod types;

pub use error::{GeoError, Result};
