//! Dataset and band persistence.
//!
//! - [`PamDataset`] - lazy-load/save controller owning the dataset store and bands
//! - [`PamRasterBand`] - per-band metadata store
//! - [`CloneFlags`] - selective copy between datasets ([`PamDataset::clone_info`])
//! - sidecar naming helpers ([`sidecar_name`], [`resolve_sibling`])

mod band;
mod band_xml;
mod clone;
mod dataset;
mod dataset_info;
mod sidecar;

pub use band::{BandStatistics, MaskFlags, MaskReference, PamRasterBand};
pub use clone::CloneFlags;
pub use dataset::PamDataset;
pub(crate) use sidecar::{remove_stale, write_with_proxy};
pub use sidecar::{can_accept_sidecar, resolve_sibling, sidecar_name, SIDECAR_SUFFIX};
