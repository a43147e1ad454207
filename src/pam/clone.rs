//! Selective metadata copy between datasets and bands.
//!
//! Each category bit is evaluated on its own. A category is copied only
//! when the source holds a value for it; with [`CloneFlags::ONLY_IF_MISSING`]
//! the destination must also be unset. Key/value metadata is merged per key
//! under `ONLY_IF_MISSING` and replaced per domain otherwise.

use std::sync::Arc;

use super::band::PamRasterBand;
use super::dataset::PamDataset;
use crate::core::{ColorInterp, MetadataDomains};
use crate::util::{Error, Result};

bitflags::bitflags! {
    /// Categories and modifiers of a metadata clone.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CloneFlags: u32 {
        const GEOTRANSFORM = 0x01;
        const PROJECTION = 0x02;
        const METADATA = 0x04;
        const GCPS = 0x08;

        const NODATA = 0x1000;
        const CATEGORY_NAMES = 0x2000;
        /// Min/max and mean/standard deviation.
        const MIN_MAX = 0x4000;
        const SCALE_OFFSET = 0x8000;
        const UNIT_TYPE = 0x10000;
        const COLOR_TABLE = 0x20000;
        const BAND_METADATA = 0x40000;
        const RAT = 0x80000;
        const MASK = 0x100000;
        const BAND_DESCRIPTION = 0x200000;
        const COLOR_INTERP = 0x400000;

        /// Never overwrite a value the destination already has.
        const ONLY_IF_MISSING = 0x1000_0000;
        /// Also clone band by band; requires equal band counts.
        const PROCESS_BANDS = 0x2000_0000;

        /// Everything, without overwriting, including bands.
        const PAM_DEFAULT = Self::GEOTRANSFORM.bits()
            | Self::PROJECTION.bits()
            | Self::METADATA.bits()
            | Self::GCPS.bits()
            | Self::NODATA.bits()
            | Self::CATEGORY_NAMES.bits()
            | Self::MIN_MAX.bits()
            | Self::SCALE_OFFSET.bits()
            | Self::UNIT_TYPE.bits()
            | Self::COLOR_TABLE.bits()
            | Self::COLOR_INTERP.bits()
            | Self::BAND_METADATA.bits()
            | Self::RAT.bits()
            | Self::MASK.bits()
            | Self::BAND_DESCRIPTION.bits()
            | Self::ONLY_IF_MISSING.bits()
            | Self::PROCESS_BANDS.bits();
    }
}

/// Copy `src` into `dst` key by key (`only_if_missing`) or domain by domain.
/// Returns true if `dst` changed.
fn merge_metadata(dst: &mut MetadataDomains, src: &MetadataDomains, only_if_missing: bool) -> bool {
    let mut changed = false;
    for domain in src.domain_names() {
        let Some(items) = src.domain(domain) else {
            continue;
        };
        if only_if_missing {
            for (key, value) in items.iter() {
                if dst.item(key, domain).is_none() {
                    dst.set_item(key, Some(value), domain);
                    changed = true;
                }
            }
        } else if dst.domain(domain) != Some(items) {
            dst.set_domain(domain, items.clone());
            changed = true;
        }
    }
    changed
}

impl PamDataset {
    /// Copy the metadata categories selected by `flags` from `source`.
    ///
    /// The dataset-level copy always runs. With
    /// [`CloneFlags::PROCESS_BANDS`] bands are then copied pairwise; when
    /// the band counts differ that pass is skipped and
    /// [`Error::InvalidCloneRequest`] is returned.
    pub fn clone_info(&mut self, source: &PamDataset, flags: CloneFlags) -> Result<()> {
        self.ensure_loaded();
        let only_if_missing = flags.contains(CloneFlags::ONLY_IF_MISSING);

        if let Some(src) = source.info() {
            let mut changed = false;
            let dst = self.info_mut();

            if flags.contains(CloneFlags::GEOTRANSFORM) {
                if let Some(gt) = src.geo_transform {
                    if !only_if_missing || dst.geo_transform.is_none() {
                        dst.geo_transform = Some(gt);
                        changed = true;
                    }
                }
            }

            if flags.contains(CloneFlags::PROJECTION) {
                if let Some(srs) = &src.srs {
                    if !only_if_missing || dst.srs.is_none() {
                        dst.srs = Some(Arc::clone(srs));
                        changed = true;
                    }
                }
            }

            if flags.contains(CloneFlags::GCPS) && !src.gcps.is_empty() {
                if !only_if_missing || dst.gcps.is_empty() {
                    dst.gcps = src.gcps.clone();
                    dst.gcp_srs = src.gcp_srs.clone();
                    changed = true;
                }
            }

            if flags.contains(CloneFlags::METADATA) {
                changed |= merge_metadata(&mut dst.metadata, &src.metadata, only_if_missing);
            }

            if changed {
                self.mark_dirty();
            }
        }

        if flags.contains(CloneFlags::PROCESS_BANDS) {
            if self.band_count() != source.band_count() {
                tracing::warn!(
                    "Skipping band metadata clone: {} source bands, {} destination bands",
                    source.band_count(),
                    self.band_count()
                );
                return Err(Error::InvalidCloneRequest {
                    source_bands: source.band_count(),
                    dest_bands: self.band_count(),
                });
            }
            for (dst, src) in self.bands.iter_mut().zip(source.bands()) {
                dst.clone_info(src, flags);
            }
        }

        Ok(())
    }
}

impl PamRasterBand {
    /// Copy the band-level categories selected by `flags` from `source`.
    /// Returns true if anything changed.
    pub fn clone_info(&mut self, source: &PamRasterBand, flags: CloneFlags) -> bool {
        let Some(src) = source.pam.as_deref() else {
            return false;
        };
        let only = flags.contains(CloneFlags::ONLY_IF_MISSING);
        let mut changed = false;
        let dst = self.pam.get_or_insert_with(Box::default);

        if flags.contains(CloneFlags::BAND_DESCRIPTION)
            && !src.description.is_empty()
            && (!only || dst.description.is_empty())
        {
            dst.description = src.description.clone();
            changed = true;
        }

        if flags.contains(CloneFlags::NODATA) && src.nodata.is_set() && (!only || !dst.nodata.is_set()) {
            dst.nodata = src.nodata;
            changed = true;
        }

        if flags.contains(CloneFlags::CATEGORY_NAMES)
            && !src.category_names.is_empty()
            && (!only || dst.category_names.is_empty())
        {
            dst.category_names = src.category_names.clone();
            changed = true;
        }

        if flags.contains(CloneFlags::SCALE_OFFSET) {
            if src.offset.is_some() && (!only || dst.offset.is_none()) {
                dst.offset = src.offset;
                changed = true;
            }
            if src.scale.is_some() && (!only || dst.scale.is_none()) {
                dst.scale = src.scale;
                changed = true;
            }
        }

        if flags.contains(CloneFlags::UNIT_TYPE) && !src.unit.is_empty() && (!only || dst.unit.is_empty()) {
            dst.unit = src.unit.clone();
            changed = true;
        }

        if flags.contains(CloneFlags::COLOR_TABLE)
            && src.color_table.is_some()
            && (!only || dst.color_table.is_none())
        {
            dst.color_table = src.color_table.clone();
            changed = true;
        }

        if flags.contains(CloneFlags::COLOR_INTERP)
            && src.color_interp != ColorInterp::Undefined
            && (!only || dst.color_interp == ColorInterp::Undefined)
        {
            dst.color_interp = src.color_interp;
            changed = true;
        }

        if flags.contains(CloneFlags::MIN_MAX) {
            if src.min_max.is_some() && (!only || dst.min_max.is_none()) {
                dst.min_max = src.min_max;
                changed = true;
            }
            if src.mean_std_dev.is_some() && (!only || dst.mean_std_dev.is_none()) {
                dst.mean_std_dev = src.mean_std_dev;
                dst.stats_approximate = src.stats_approximate;
                changed = true;
            }
        }

        if flags.contains(CloneFlags::BAND_METADATA) {
            changed |= merge_metadata(&mut dst.metadata, &src.metadata, only);
        }

        if flags.contains(CloneFlags::RAT) && src.rat.is_some() && (!only || dst.rat.is_none()) {
            dst.rat = src.rat.clone();
            changed = true;
        }

        if flags.contains(CloneFlags::MASK) && src.mask.is_some() && (!only || dst.mask.is_none()) {
            dst.mask = src.mask;
            changed = true;
        }

        if changed {
            self.mark_parent_dirty();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AttributeTable, Nodata, RatTableType};

    #[test]
    fn test_band_clone_only_if_missing() {
        let mut src = PamRasterBand::new(1);
        src.set_no_data_value_i64(-9999);
        src.set_unit_type("m");
        src.set_offset(10.0);

        let mut dst = PamRasterBand::new(1);
        dst.set_unit_type("ft");

        let flags = CloneFlags::NODATA | CloneFlags::UNIT_TYPE | CloneFlags::SCALE_OFFSET | CloneFlags::ONLY_IF_MISSING;
        assert!(dst.clone_info(&src, flags));
        assert_eq!(dst.no_data(), Nodata::Int64(-9999));
        assert_eq!(dst.unit_type(), "ft");
        assert_eq!(dst.offset(), (10.0, true));
        assert_eq!(dst.scale(), (1.0, false));

        assert!(dst.clone_info(&src, CloneFlags::UNIT_TYPE));
        assert_eq!(dst.unit_type(), "m");
    }

    #[test]
    fn test_band_clone_shares_rat() {
        let mut src = PamRasterBand::new(1);
        src.set_default_rat(Some(Arc::new(AttributeTable::new(RatTableType::Athematic))));
        let mut dst = PamRasterBand::new(1);
        dst.clone_info(&src, CloneFlags::RAT);
        assert!(Arc::ptr_eq(src.default_rat().unwrap(), dst.default_rat().unwrap()));
    }

    #[test]
    fn test_unselected_categories_untouched() {
        let mut src = PamRasterBand::new(1);
        src.set_color_interpretation(ColorInterp::Red);
        let mut dst = PamRasterBand::new(1);
        assert!(!dst.clone_info(&src, CloneFlags::COLOR_TABLE));
        assert_eq!(dst.color_interpretation(), ColorInterp::Undefined);
        assert!(dst.clone_info(&src, CloneFlags::COLOR_INTERP));
        assert_eq!(dst.color_interpretation(), ColorInterp::Red);
    }

    #[test]
    fn test_metadata_merge() {
        let mut src = MetadataDomains::new();
        src.set_item("A", Some("src"), "");
        src.set_item("B", Some("src"), "");
        let mut dst = MetadataDomains::new();
        dst.set_item("A", Some("dst"), "");

        assert!(merge_metadata(&mut dst, &src, true));
        assert_eq!(dst.item("A", ""), Some("dst"));
        assert_eq!(dst.item("B", ""), Some("src"));
        assert!(!merge_metadata(&mut dst, &src, true));

        assert!(merge_metadata(&mut dst, &src, false));
        assert_eq!(dst.item("A", ""), Some("src"));
    }

    #[test]
    fn test_pam_default_contents() {
        assert!(CloneFlags::PAM_DEFAULT.contains(CloneFlags::ONLY_IF_MISSING | CloneFlags::PROCESS_BANDS));
        assert!(CloneFlags::PAM_DEFAULT.contains(CloneFlags::COLOR_INTERP | CloneFlags::GEOTRANSFORM));
    }
}
