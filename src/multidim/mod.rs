//! Metadata persistence for multidimensional arrays.
//!
//! All arrays of one file share a single [`PamMultiDim`] store keyed by
//! array full name and context. [`PamMdArray`] is the per-array handle.

mod array;
mod store;

pub use array::PamMdArray;
pub use store::{ArrayStatistics, PamMultiDim};
