//! # raster-pam
//!
//! Persistent auxiliary metadata for raster datasets.
//!
//! Drivers that cannot store georeferencing, statistics, color tables,
//! nodata values or arbitrary key/value metadata in their own format keep
//! them in a `.aux.xml` sidecar next to the data file. This crate holds
//! that metadata in memory, loads it lazily, tracks dirtiness and writes
//! it back on flush or drop, redirecting to a proxy directory when the
//! data file's directory is not writable.
//!
//! ## Modules
//!
//! - [`util`] - Errors and configuration
//! - [`xml`] - Generic element tree and sidecar file I/O
//! - [`core`] - Metadata value types (SRS, nodata, histograms, RAT, proxies)
//! - [`pam`] - Dataset and band stores with lazy load/save
//! - [`multidim`] - Per-file store for multidimensional arrays
//!
//! ## Example
//!
//! ```no_run
//! use raster_pam::prelude::*;
//!
//! let mut ds = PamDataset::open("elevation.tif", 1, None);
//! ds.set_geo_transform(GeoTransform::new([440720.0, 60.0, 0.0, 3751320.0, 0.0, -60.0]));
//! ds.band_mut(1)?.set_no_data_value(-9999.0);
//! ds.flush()?;
//! # Ok::<(), raster_pam::Error>(())
//! ```

pub mod util;
pub mod xml;
pub mod core;
pub mod pam;
pub mod multidim;

pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, PamConfig, Result};
    pub use crate::core::{
        AttributeTable, ColorEntry, ColorInterp, ColorTable, Gcp, GeoTransform, HistogramRequest,
        Nodata, PamFlags, ProxyRegistry, SpatialRef,
    };
    pub use crate::pam::{CloneFlags, PamDataset, PamRasterBand};
    pub use crate::multidim::{ArrayStatistics, PamMdArray, PamMultiDim};
}
