//! Array handle bound to a shared [`PamMultiDim`] store.

use std::sync::Arc;

use super::store::{ArrayStatistics, PamMultiDim};
use crate::core::SpatialRef;
use crate::util::Result;

/// Metadata view of one array of a multidimensional file.
///
/// Without a store every getter reports nothing and setters are ignored.
#[derive(Clone, Debug)]
pub struct PamMdArray {
    full_name: String,
    context: String,
    pam: Option<Arc<PamMultiDim>>,
}

impl PamMdArray {
    /// Array `name` under group `parent_path` (`"/"` for the root group).
    pub fn new(
        parent_path: &str,
        name: &str,
        context: impl Into<String>,
        pam: Option<Arc<PamMultiDim>>,
    ) -> Self {
        let full_name = if parent_path.ends_with('/') {
            format!("{parent_path}{name}")
        } else {
            format!("{parent_path}/{name}")
        };
        Self {
            full_name,
            context: context.into(),
            pam,
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn pam(&self) -> Option<&Arc<PamMultiDim>> {
        self.pam.as_ref()
    }

    pub fn spatial_ref(&self) -> Option<Arc<SpatialRef>> {
        self.pam.as_ref()?.spatial_ref(&self.full_name, &self.context)
    }

    /// Returns false when no store is attached.
    pub fn set_spatial_ref(&self, srs: Option<Arc<SpatialRef>>) -> bool {
        match &self.pam {
            Some(pam) => {
                pam.set_spatial_ref(&self.full_name, &self.context, srs);
                true
            }
            None => false,
        }
    }

    pub fn statistics(&self, approx_ok: bool) -> Option<ArrayStatistics> {
        self.pam.as_ref()?.statistics(&self.full_name, &self.context, approx_ok)
    }

    /// Returns false when no store is attached.
    pub fn set_statistics(&self, stats: ArrayStatistics) -> bool {
        match &self.pam {
            Some(pam) => {
                pam.set_statistics(&self.full_name, &self.context, stats);
                true
            }
            None => false,
        }
    }

    pub fn clear_statistics(&self) {
        if let Some(pam) = &self.pam {
            pam.clear_array_statistics(&self.full_name, &self.context);
        }
    }

    /// Cached statistics, or freshly computed ones when nothing suitable is
    /// stored and `force` is set. Computed statistics are stored.
    pub fn statistics_or_compute(
        &self,
        approx_ok: bool,
        force: bool,
        compute: impl FnOnce() -> Result<ArrayStatistics>,
    ) -> Result<Option<ArrayStatistics>> {
        if let Some(stats) = self.statistics(approx_ok) {
            return Ok(Some(stats));
        }
        if !force {
            return Ok(None);
        }
        let stats = compute()?;
        self.set_statistics(stats);
        Ok(Some(stats))
    }
}
