//! Per-band auxiliary metadata.

use std::sync::{Arc, Weak};

use crate::core::{
    AttributeTable, ColorInterp, ColorTable, HistogramCache, HistogramEntry, HistogramRequest,
    MetaData, MetadataDomains, Nodata, PamFlagCell, PamFlags, PamParent,
};
use crate::util::{Error, Result};
use crate::xml::XmlNode;

bitflags::bitflags! {
    /// Kind of validity mask attached to a band.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaskFlags: u32 {
        /// Every pixel is valid.
        const ALL_VALID = 0x01;
        /// One mask shared by all bands of the dataset.
        const PER_DATASET = 0x02;
        /// The mask is an alpha band.
        const ALPHA = 0x04;
        /// The mask is derived from the nodata value.
        const NODATA = 0x08;
    }
}

/// Reference to the band's validity mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MaskReference {
    pub flags: MaskFlags,
    /// Band number holding the mask, when it is another band of the dataset.
    pub band: Option<usize>,
}

impl MaskReference {
    /// Create a mask reference.
    pub fn new(flags: MaskFlags, band: Option<usize>) -> Self {
        Self { flags, band }
    }
}

/// Min, max, mean and standard deviation of a band.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// Computed from a subsample.
    pub approximate: bool,
}

/// Band metadata store. Allocated on first touch.
#[derive(Clone, Debug, Default)]
pub(crate) struct BandPamInfo {
    pub description: String,
    pub nodata: Nodata,
    pub color_table: Option<ColorTable>,
    pub color_interp: ColorInterp,
    pub unit: String,
    pub category_names: Vec<String>,
    pub offset: Option<f64>,
    pub scale: Option<f64>,
    pub min_max: Option<(f64, f64)>,
    pub mean_std_dev: Option<(f64, f64)>,
    pub stats_approximate: bool,
    pub histograms: HistogramCache,
    pub rat: Option<Arc<AttributeTable>>,
    pub mask: Option<MaskReference>,
    pub metadata: MetadataDomains,
    pub other_nodes: Vec<XmlNode>,
}

/// A raster band carrying persistent auxiliary metadata.
///
/// Bands are numbered from 1. Every setter marks the owning dataset dirty
/// through its [`PamParent`] capability; a band without a live parent keeps
/// its values in memory only.
pub struct PamRasterBand {
    number: usize,
    parent: Weak<dyn PamParent>,
    pub(crate) pam: Option<Box<BandPamInfo>>,
}

impl std::fmt::Debug for PamRasterBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PamRasterBand")
            .field("number", &self.number)
            .field("pam", &self.pam)
            .finish()
    }
}

impl PamRasterBand {
    /// Create a detached band.
    pub fn new(number: usize) -> Self {
        Self {
            number,
            parent: Weak::<PamFlagCell>::new(),
            pam: None,
        }
    }

    /// Create a band reporting to `parent`.
    pub fn with_parent(number: usize, parent: Weak<dyn PamParent>) -> Self {
        Self {
            number,
            parent,
            pam: None,
        }
    }

    /// Band number (1-based).
    #[inline]
    pub fn number(&self) -> usize {
        self.number
    }

    /// Check if the metadata store has been allocated.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.pam.is_some()
    }

    /// Allocate the metadata store if absent. No I/O.
    pub fn initialize(&mut self) {
        self.info_mut();
    }

    /// Release the metadata store.
    pub fn clear(&mut self) {
        self.pam = None;
    }

    /// Flags of the owning dataset, if it is alive.
    pub fn parent_flags(&self) -> Option<PamFlags> {
        self.parent.upgrade().map(|p| p.flags())
    }

    fn mark_dirty(&self) {
        if let Some(parent) = self.parent.upgrade() {
            parent.mark_dirty();
        }
    }

    fn info(&self) -> Option<&BandPamInfo> {
        self.pam.as_deref()
    }

    fn info_mut(&mut self) -> &mut BandPamInfo {
        self.pam.get_or_insert_with(Box::default)
    }

    /// Apply a change to the store and mark the parent dirty.
    fn update<R>(&mut self, f: impl FnOnce(&mut BandPamInfo) -> R) -> R {
        let result = f(self.info_mut());
        self.mark_dirty();
        result
    }

    // ---- description

    /// Band description.
    pub fn description(&self) -> &str {
        self.info().map_or("", |p| p.description.as_str())
    }

    /// Set the band description.
    pub fn set_description(&mut self, description: impl Into<String>) {
        let description = description.into();
        self.update(|p| p.description = description);
    }

    // ---- nodata

    /// Nodata cell.
    pub fn no_data(&self) -> Nodata {
        self.info().map(|p| p.nodata).unwrap_or_default()
    }

    /// Nodata as a double, with a success flag.
    pub fn no_data_value(&self) -> (f64, bool) {
        self.no_data().double()
    }

    /// Nodata as a signed 64-bit integer, with a success flag.
    pub fn no_data_value_i64(&self) -> (i64, bool) {
        self.no_data().int64()
    }

    /// Nodata as an unsigned 64-bit integer, with a success flag.
    pub fn no_data_value_u64(&self) -> (u64, bool) {
        self.no_data().uint64()
    }

    /// Set a double nodata value, clearing the integer representations.
    pub fn set_no_data_value(&mut self, value: f64) {
        self.update(|p| p.nodata.set_double(value));
    }

    /// Set a signed 64-bit nodata value, clearing the other representations.
    pub fn set_no_data_value_i64(&mut self, value: i64) {
        self.update(|p| p.nodata.set_int64(value));
    }

    /// Set an unsigned 64-bit nodata value, clearing the other representations.
    pub fn set_no_data_value_u64(&mut self, value: u64) {
        self.update(|p| p.nodata.set_uint64(value));
    }

    /// Clear every nodata representation.
    pub fn delete_no_data_value(&mut self) {
        self.update(|p| p.nodata.clear());
    }

    // ---- color

    /// Color table.
    pub fn color_table(&self) -> Option<&ColorTable> {
        self.info().and_then(|p| p.color_table.as_ref())
    }

    /// Replace the color table; `None` removes it.
    pub fn set_color_table(&mut self, table: Option<ColorTable>) {
        self.update(|p| p.color_table = table);
    }

    /// Color interpretation.
    pub fn color_interpretation(&self) -> ColorInterp {
        self.info().map(|p| p.color_interp).unwrap_or_default()
    }

    /// Set the color interpretation.
    pub fn set_color_interpretation(&mut self, interp: ColorInterp) {
        self.update(|p| p.color_interp = interp);
    }

    // ---- units, categories, scaling

    /// Unit of the pixel values ("" when unknown).
    pub fn unit_type(&self) -> &str {
        self.info().map_or("", |p| p.unit.as_str())
    }

    /// Set the unit of the pixel values.
    pub fn set_unit_type(&mut self, unit: impl Into<String>) {
        let unit = unit.into();
        self.update(|p| p.unit = unit);
    }

    /// Category names, indexed by pixel value.
    pub fn category_names(&self) -> &[String] {
        self.info()
            .map(|p| p.category_names.as_slice())
            .unwrap_or_default()
    }

    /// Replace the category names wholesale.
    pub fn set_category_names(&mut self, names: Vec<String>) {
        self.update(|p| p.category_names = names);
    }

    /// Offset applied to raw values, with an is-set flag (default 0).
    pub fn offset(&self) -> (f64, bool) {
        match self.info().and_then(|p| p.offset) {
            Some(v) => (v, true),
            None => (0.0, false),
        }
    }

    /// Set the offset.
    pub fn set_offset(&mut self, offset: f64) {
        self.update(|p| p.offset = Some(offset));
    }

    /// Scale applied to raw values, with an is-set flag (default 1).
    pub fn scale(&self) -> (f64, bool) {
        match self.info().and_then(|p| p.scale) {
            Some(v) => (v, true),
            None => (1.0, false),
        }
    }

    /// Set the scale.
    pub fn set_scale(&mut self, scale: f64) {
        self.update(|p| p.scale = Some(scale));
    }

    // ---- statistics

    /// Minimum and maximum.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.info().and_then(|p| p.min_max)
    }

    /// Set minimum and maximum.
    pub fn set_min_max(&mut self, min: f64, max: f64) {
        self.update(|p| p.min_max = Some((min, max)));
    }

    /// Mean and standard deviation, with the approximate flag.
    pub fn mean_std_dev(&self) -> Option<(f64, f64, bool)> {
        self.info()
            .and_then(|p| p.mean_std_dev.map(|(m, s)| (m, s, p.stats_approximate)))
    }

    /// Set mean and standard deviation.
    pub fn set_mean_std_dev(&mut self, mean: f64, std_dev: f64, approximate: bool) {
        self.update(|p| {
            p.mean_std_dev = Some((mean, std_dev));
            p.stats_approximate = approximate;
        });
    }

    /// Full statistics, when both min/max and mean/stddev are known.
    pub fn statistics(&self) -> Option<BandStatistics> {
        let p = self.info()?;
        let (min, max) = p.min_max?;
        let (mean, std_dev) = p.mean_std_dev?;
        Some(BandStatistics {
            min,
            max,
            mean,
            std_dev,
            approximate: p.stats_approximate,
        })
    }

    /// Set all statistics at once.
    pub fn set_statistics(&mut self, stats: BandStatistics) {
        self.update(|p| {
            p.min_max = Some((stats.min, stats.max));
            p.mean_std_dev = Some((stats.mean, stats.std_dev));
            p.stats_approximate = stats.approximate;
        });
    }

    /// Drop statistics, histograms and `STATISTICS_*` metadata items.
    /// Returns true if anything was removed.
    pub fn clear_statistics(&mut self) -> bool {
        let Some(p) = self.pam.as_deref_mut() else {
            return false;
        };
        let mut changed = p.min_max.take().is_some();
        changed |= p.mean_std_dev.take().is_some();
        p.stats_approximate = false;
        if !p.histograms.is_empty() {
            p.histograms.clear();
            changed = true;
        }
        for (_, items) in p.metadata.domains_mut() {
            changed |= items.remove_prefixed("STATISTICS_") > 0;
        }
        if changed {
            self.mark_dirty();
        }
        changed
    }

    // ---- histograms

    /// Histogram cache.
    pub fn histograms(&self) -> Option<&HistogramCache> {
        self.info().map(|p| &p.histograms)
    }

    /// Cached histogram matching `request`, without computing.
    pub fn find_histogram(&self, request: &HistogramRequest) -> Option<&HistogramEntry> {
        self.histograms().and_then(|h| h.find_matching(request))
    }

    /// Histogram for `request`, from the cache or computed by `compute`.
    ///
    /// `compute` returns the bucket counts; the new entry is cached and
    /// marked approximate when the request accepts approximation.
    pub fn histogram(
        &mut self,
        request: &HistogramRequest,
        compute: impl FnOnce(&HistogramRequest) -> Result<Vec<u64>>,
    ) -> Result<HistogramEntry> {
        if let Some(hit) = self.find_histogram(request) {
            return Ok(hit.clone());
        }

        let counts = compute(request)?;
        if counts.len() != request.bucket_count {
            return Err(Error::invalid_value(
                "HistCounts",
                format!("{} counts for {} buckets", counts.len(), request.bucket_count),
            ));
        }
        let entry = HistogramEntry::new(
            request.min,
            request.max,
            counts,
            request.include_out_of_range,
            request.approx_ok,
        );
        tracing::debug!(
            "Caching histogram for band {} ({} buckets)",
            self.number,
            entry.bucket_count
        );
        self.update(|p| p.histograms.insert(entry.clone()));
        Ok(entry)
    }

    /// Insert a computed histogram into the cache.
    pub fn insert_histogram(&mut self, entry: HistogramEntry) {
        self.update(|p| p.histograms.insert(entry));
    }

    /// The default histogram (most recently stored).
    pub fn default_histogram(&self) -> Option<&HistogramEntry> {
        self.histograms().and_then(HistogramCache::first)
    }

    /// Store the default histogram. It folds out-of-range values and is exact.
    pub fn set_default_histogram(&mut self, min: f64, max: f64, counts: Vec<u64>) {
        self.insert_histogram(HistogramEntry::new(min, max, counts, true, false));
    }

    // ---- attribute table, mask

    /// Default raster attribute table.
    pub fn default_rat(&self) -> Option<&Arc<AttributeTable>> {
        self.info().and_then(|p| p.rat.as_ref())
    }

    /// Replace the default raster attribute table; `None` removes it.
    pub fn set_default_rat(&mut self, rat: Option<Arc<AttributeTable>>) {
        self.update(|p| p.rat = rat);
    }

    /// Mask reference.
    pub fn mask(&self) -> Option<MaskReference> {
        self.info().and_then(|p| p.mask)
    }

    /// Set the mask reference.
    pub fn set_mask(&mut self, mask: Option<MaskReference>) {
        self.update(|p| p.mask = mask);
    }

    // ---- metadata

    /// Items of a metadata domain ("" is the default domain).
    pub fn metadata(&self, domain: &str) -> Option<&MetaData> {
        self.info().and_then(|p| p.metadata.domain(domain))
    }

    /// One metadata item.
    pub fn metadata_item(&self, key: &str, domain: &str) -> Option<&str> {
        self.info().and_then(|p| p.metadata.item(key, domain))
    }

    /// Replace a metadata domain.
    pub fn set_metadata(&mut self, domain: &str, items: MetaData) {
        self.update(|p| p.metadata.set_domain(domain, items));
    }

    /// Set or remove one metadata item.
    pub fn set_metadata_item(&mut self, key: &str, value: Option<&str>, domain: &str) {
        self.update(|p| p.metadata.set_item(key, value, domain));
    }

    /// Names of metadata domains holding items.
    pub fn metadata_domains(&self) -> Vec<&str> {
        self.info()
            .map(|p| p.metadata.domain_names())
            .unwrap_or_default()
    }

    pub(crate) fn mark_parent_dirty(&self) {
        self.mark_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached() -> (Arc<PamFlagCell>, PamRasterBand) {
        let cell = Arc::new(PamFlagCell::default());
        let weak = Arc::downgrade(&cell) as Weak<dyn PamParent>;
        (cell, PamRasterBand::with_parent(1, weak))
    }

    #[test]
    fn test_lazy_allocation() {
        let (cell, mut band) = attached();
        assert!(!band.is_initialized());
        assert_eq!(band.unit_type(), "");
        assert_eq!(band.scale(), (1.0, false));
        assert!(!band.is_initialized());
        assert!(!cell.contains(PamFlags::DIRTY));

        band.set_unit_type("m");
        assert!(band.is_initialized());
        assert!(cell.contains(PamFlags::DIRTY));
    }

    #[test]
    fn test_nodata_exclusive() {
        let (_cell, mut band) = attached();
        band.set_no_data_value_i64(-9999);
        assert_eq!(band.no_data_value(), (0.0, false));
        assert_eq!(band.no_data_value_i64(), (-9999, true));

        band.set_no_data_value(f64::NAN);
        assert!(band.no_data_value().0.is_nan());
        assert!(!band.no_data_value_i64().1);

        band.delete_no_data_value();
        assert!(!band.no_data().is_set());
    }

    #[test]
    fn test_statistics() {
        let (_cell, mut band) = attached();
        band.set_min_max(0.0, 10.0);
        assert!(band.statistics().is_none());
        band.set_mean_std_dev(5.0, 2.0, true);
        let stats = band.statistics().unwrap();
        assert_eq!((stats.min, stats.max, stats.mean, stats.std_dev), (0.0, 10.0, 5.0, 2.0));
        assert!(stats.approximate);

        band.set_metadata_item("STATISTICS_MEAN", Some("5"), "");
        band.set_metadata_item("AREA_OR_POINT", Some("Area"), "");
        band.set_default_histogram(0.0, 10.0, vec![1, 2]);
        assert!(band.clear_statistics());
        assert!(band.min_max().is_none());
        assert!(band.default_histogram().is_none());
        assert_eq!(band.metadata_item("STATISTICS_MEAN", ""), None);
        assert_eq!(band.metadata_item("AREA_OR_POINT", ""), Some("Area"));
        assert!(!band.clear_statistics());
    }

    #[test]
    fn test_histogram_computed_once() {
        let (_cell, mut band) = attached();
        let request = HistogramRequest::new(0.0, 255.0, 4).approx_ok(true);
        let mut calls = 0;
        let first = band
            .histogram(&request, |_| {
                calls += 1;
                Ok(vec![1, 2, 3, 4])
            })
            .unwrap();
        assert!(first.approximate);

        let again = band
            .histogram(&HistogramRequest::new(0.0001, 255.0, 4).approx_ok(true), |_| {
                calls += 1;
                Ok(vec![0; 4])
            })
            .unwrap();
        assert_eq!(again.counts, vec![1, 2, 3, 4]);
        assert_eq!(calls, 1);

        let bad = band.histogram(&HistogramRequest::new(0.0, 1.0, 3), |_| Ok(vec![1]));
        assert!(bad.is_err());
    }

    #[test]
    fn test_detached_band_keeps_values() {
        let mut band = PamRasterBand::new(2);
        band.set_offset(1.5);
        assert_eq!(band.offset(), (1.5, true));
        assert!(band.parent_flags().is_none());
    }
}
