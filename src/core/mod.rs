//! Core layer - value types and shared state of the PAM engine.
//!
//! This module provides:
//! - [`PamFlags`] / [`PamParent`] - Persistence state and the band-to-dataset capability
//! - [`Nodata`] - Multi-typed nodata cell
//! - [`HistogramCache`] - Computed histograms with approximate lookup
//! - [`ProxyRegistry`] - Substitute sidecar locations for unwritable paths
//! - [`MetaData`] / [`MetadataDomains`] - Key-value metadata storage
//! - [`SpatialRef`], [`GeoTransform`], [`Gcp`] - Georeferencing
//! - [`ColorTable`], [`ColorInterp`], [`AttributeTable`] - Band descriptors

mod color;
mod flags;
mod geo;
mod histogram;
mod metadata;
mod nodata;
mod proxy;
mod rat;
mod srs;
pub(crate) mod text;

pub use color::{ColorEntry, ColorInterp, ColorTable};
pub use flags::{PamFlagCell, PamFlags, PamParent};
pub use geo::{Gcp, GeoTransform};
pub(crate) use geo::{gcp_list_from_xml, gcp_list_to_xml};
pub use histogram::{HistogramCache, HistogramEntry, HistogramRequest, DEFAULT_HISTOGRAM_TOLERANCE};
pub use metadata::{MetaData, MetadataDomains};
pub use nodata::{Nodata, DEFAULT_NODATA, DEFAULT_NODATA_INT64, DEFAULT_NODATA_UINT64};
pub use proxy::{ProxyRegistry, PROXY_INDEX_FILE};
pub use rat::{AttributeTable, RatColumn, RatFieldType, RatFieldUsage, RatTableType, RatValue};
pub use srs::SpatialRef;
