//! EOPF Zarr products over [`zarrs`] storage.
//!
//! Composite `EOPFZARR:` addresses are parsed by [`address`], georeferencing is resolved from
//! the product's JSON attributes by [`georef`], and [`driver::Driver`] ties both to an underlying
//! Zarr store to produce an [`dataset::EopfDataset`].
pub mod address;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod driver;
mod error;
pub mod georef;
pub mod json;
pub mod perf;
pub mod store;
pub mod subdataset;

pub use zarrs;

pub use error::{Error, Result};

/// Log target for driver messages.
pub const LOG_TARGET: &str = "EOPFZARR";
