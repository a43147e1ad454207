//! Histogram cache with approximate-bounds matching.
//!
//! Entries are kept most-recent-first. A lookup matches on exact bucket
//! count and out-of-range handling, accepts approximate entries only when
//! the caller allows them, and compares the bounds with a relative
//! tolerance so that values that went through a text round trip or a
//! slightly different min/max computation still hit.

use crate::core::text::{format_f64, format_flag, parse_f64, parse_flag, parse_u64};
use crate::util::{Error, Result};
use crate::xml::XmlNode;

/// Default relative tolerance applied to histogram bounds.
pub const DEFAULT_HISTOGRAM_TOLERANCE: f64 = 1e-6;

/// One computed histogram.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramEntry {
    pub min: f64,
    pub max: f64,
    pub bucket_count: usize,
    pub include_out_of_range: bool,
    pub approximate: bool,
    pub counts: Vec<u64>,
}

impl HistogramEntry {
    /// Create an entry; the bucket count is taken from `counts`.
    pub fn new(min: f64, max: f64, counts: Vec<u64>, include_out_of_range: bool, approximate: bool) -> Self {
        Self {
            min,
            max,
            bucket_count: counts.len(),
            include_out_of_range,
            approximate,
            counts,
        }
    }

    /// Sum of all bucket counts.
    pub fn total(&self) -> u64 {
        self.counts.iter().fold(0u64, |acc, c| acc.saturating_add(*c))
    }

    /// Same key as another entry (bounds compared exactly).
    fn same_key(&self, other: &HistogramEntry) -> bool {
        self.min.to_bits() == other.min.to_bits()
            && self.max.to_bits() == other.max.to_bits()
            && self.bucket_count == other.bucket_count
            && self.include_out_of_range == other.include_out_of_range
            && self.approximate == other.approximate
    }

    /// Serialize to a `<HistItem>` element.
    pub(crate) fn to_xml(&self) -> XmlNode {
        let mut item = XmlNode::new("HistItem");
        item.push_text("HistMin", format_f64(self.min));
        item.push_text("HistMax", format_f64(self.max));
        item.push_text("BucketCount", self.bucket_count.to_string());
        item.push_text("IncludeOutOfRange", format_flag(self.include_out_of_range));
        item.push_text("Approximate", format_flag(self.approximate));
        let counts: Vec<String> = self.counts.iter().map(u64::to_string).collect();
        item.push_text("HistCounts", counts.join(","));
        item
    }

    /// Parse a `<HistItem>` element.
    ///
    /// Counts may be separated by `,` or `|`. The count list must hold
    /// exactly `BucketCount` values.
    pub(crate) fn from_xml(item: &XmlNode) -> Result<Self> {
        let min = parse_f64("HistMin", item.child_text("HistMin").unwrap_or("0"))?;
        let max = parse_f64("HistMax", item.child_text("HistMax").unwrap_or("0"))?;
        let bucket_text = item.child_text("BucketCount").unwrap_or("0");
        let bucket_count = bucket_text
            .trim()
            .parse::<usize>()
            .map_err(|_| Error::invalid_value("BucketCount", bucket_text))?;
        let include_out_of_range =
            parse_flag("IncludeOutOfRange", item.child_text("IncludeOutOfRange").unwrap_or("0"))?;
        let approximate = parse_flag("Approximate", item.child_text("Approximate").unwrap_or("0"))?;

        let counts_text = item.child_text("HistCounts").unwrap_or("");
        let counts = counts_text
            .split([',', '|'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_u64("HistCounts", s))
            .collect::<Result<Vec<_>>>()?;

        if counts.len() != bucket_count {
            return Err(Error::invalid_value(
                "HistCounts",
                format!("{} counts for {} buckets", counts.len(), bucket_count),
            ));
        }

        Ok(Self {
            min,
            max,
            bucket_count,
            include_out_of_range,
            approximate,
            counts,
        })
    }
}

/// Parameters of a histogram lookup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistogramRequest {
    pub min: f64,
    pub max: f64,
    pub bucket_count: usize,
    pub include_out_of_range: bool,
    /// Accept an approximate (sampled) histogram.
    pub approx_ok: bool,
}

impl HistogramRequest {
    /// Exact request: no out-of-range folding, no approximation.
    pub fn new(min: f64, max: f64, bucket_count: usize) -> Self {
        Self {
            min,
            max,
            bucket_count,
            include_out_of_range: false,
            approx_ok: false,
        }
    }

    /// Builder-style approximation switch.
    pub fn approx_ok(mut self, approx_ok: bool) -> Self {
        self.approx_ok = approx_ok;
        self
    }

    /// Builder-style out-of-range switch.
    pub fn include_out_of_range(mut self, include: bool) -> Self {
        self.include_out_of_range = include;
        self
    }
}

/// Ordered histogram cache, most recent first.
#[derive(Clone, Debug)]
pub struct HistogramCache {
    entries: Vec<HistogramEntry>,
    /// Stored items that could not be parsed, written back untouched.
    unparsed: Vec<XmlNode>,
    tolerance: f64,
}

impl Default for HistogramCache {
    fn default() -> Self {
        Self::with_tolerance(DEFAULT_HISTOGRAM_TOLERANCE)
    }
}

impl HistogramCache {
    /// Create an empty cache with the default tolerance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache with a custom relative tolerance.
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            entries: Vec::new(),
            unparsed: Vec::new(),
            tolerance: tolerance.abs(),
        }
    }

    /// Relative tolerance applied to bounds.
    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Change the relative tolerance.
    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance.abs();
    }

    /// First matching entry, most recent first.
    pub fn find_matching(&self, request: &HistogramRequest) -> Option<&HistogramEntry> {
        let eps = self.tolerance * bounds_scale(request.min, request.max);
        self.entries.iter().find(|e| {
            e.bucket_count == request.bucket_count
                && e.include_out_of_range == request.include_out_of_range
                && (request.approx_ok || !e.approximate)
                && (e.min - request.min).abs() <= eps
                && (e.max - request.max).abs() <= eps
        })
    }

    /// Insert at the front. An older entry with the same key is replaced.
    pub fn insert(&mut self, entry: HistogramEntry) {
        self.entries.retain(|e| !e.same_key(&entry));
        self.entries.insert(0, entry);
    }

    /// The most recent entry (the "default" histogram).
    pub fn first(&self) -> Option<&HistogramEntry> {
        self.entries.first()
    }

    /// Iterate entries, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &HistogramEntry> {
        self.entries.iter()
    }

    /// Number of parsed entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache holds nothing, parsed or not.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.unparsed.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.unparsed.clear();
    }

    /// Serialize to a `<Histograms>` element; `None` when empty.
    pub(crate) fn to_xml(&self) -> Option<XmlNode> {
        if self.is_empty() {
            return None;
        }
        let mut node = XmlNode::new("Histograms");
        for entry in &self.entries {
            node.push(entry.to_xml());
        }
        for raw in &self.unparsed {
            node.push(raw.clone());
        }
        Some(node)
    }

    /// Load from a `<Histograms>` element, keeping document order.
    pub(crate) fn load_xml(&mut self, node: &XmlNode) {
        self.clear();
        for child in &node.children {
            let parsed = if child.name == "HistItem" {
                HistogramEntry::from_xml(child).ok()
            } else {
                None
            };
            match parsed {
                Some(entry) => self.entries.push(entry),
                None => {
                    tracing::debug!("Keeping unparsed histogram node <{}>", child.name);
                    self.unparsed.push(child.clone());
                }
            }
        }
    }
}

/// Magnitude that the relative tolerance is applied to.
fn bounds_scale(min: f64, max: f64) -> f64 {
    let range = (max - min).abs();
    if range > 0.0 && range.is_finite() {
        range
    } else {
        min.abs().max(max.abs()).max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(min: f64, max: f64, buckets: usize, approx: bool) -> HistogramEntry {
        HistogramEntry::new(min, max, vec![1; buckets], false, approx)
    }

    #[test]
    fn test_match_within_tolerance() {
        let mut cache = HistogramCache::new();
        cache.insert(entry(0.0, 255.0, 256, false));

        let req = HistogramRequest::new(0.0001, 255.0, 256).approx_ok(true);
        assert!(cache.find_matching(&req).is_some());

        let req = HistogramRequest::new(0.0001, 255.0, 128).approx_ok(true);
        assert!(cache.find_matching(&req).is_none());

        let req = HistogramRequest::new(1.0, 255.0, 256).approx_ok(true);
        assert!(cache.find_matching(&req).is_none());
    }

    #[test]
    fn test_approximate_requires_approx_ok() {
        let mut cache = HistogramCache::new();
        cache.insert(entry(0.0, 10.0, 10, true));

        assert!(cache.find_matching(&HistogramRequest::new(0.0, 10.0, 10)).is_none());
        assert!(cache
            .find_matching(&HistogramRequest::new(0.0, 10.0, 10).approx_ok(true))
            .is_some());
    }

    #[test]
    fn test_out_of_range_must_agree() {
        let mut cache = HistogramCache::new();
        cache.insert(HistogramEntry::new(0.0, 1.0, vec![3, 4], true, false));

        assert!(cache.find_matching(&HistogramRequest::new(0.0, 1.0, 2)).is_none());
        assert!(cache
            .find_matching(&HistogramRequest::new(0.0, 1.0, 2).include_out_of_range(true))
            .is_some());
    }

    #[test]
    fn test_most_recent_first() {
        let mut cache = HistogramCache::new();
        let mut older = entry(0.0, 100.0, 4, false);
        older.counts = vec![1, 1, 1, 1];
        let mut newer = entry(0.00001, 100.0, 4, false);
        newer.counts = vec![9, 9, 9, 9];
        cache.insert(older);
        cache.insert(newer);

        let hit = cache.find_matching(&HistogramRequest::new(0.0, 100.0, 4)).unwrap();
        assert_eq!(hit.counts, vec![9, 9, 9, 9]);
        assert_eq!(cache.first().unwrap().counts, vec![9, 9, 9, 9]);
    }

    #[test]
    fn test_insert_replaces_same_key() {
        let mut cache = HistogramCache::new();
        cache.insert(entry(0.0, 1.0, 2, false));
        cache.insert(entry(0.0, 1.0, 2, false));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_range_request() {
        let mut cache = HistogramCache::new();
        cache.insert(entry(5.0, 5.0, 1, false));
        assert!(cache.find_matching(&HistogramRequest::new(5.0, 5.0, 1)).is_some());
        assert!(cache.find_matching(&HistogramRequest::new(5.1, 5.1, 1)).is_none());
    }

    #[test]
    fn test_large_counts_survive_xml() {
        let e = HistogramEntry::new(-0.5, 255.5, vec![u64::MAX, 0, 1 << 60], true, true);
        let back = HistogramEntry::from_xml(&e.to_xml()).unwrap();
        assert_eq!(back, e);
        assert_eq!(back.total(), u64::MAX);
    }

    #[test]
    fn test_pipe_separated_counts_and_unparsed() {
        let mut item = XmlNode::new("HistItem");
        item.push_text("HistMin", "0");
        item.push_text("HistMax", "2");
        item.push_text("BucketCount", "2");
        item.push_text("HistCounts", "5|6");
        let mut node = XmlNode::new("Histograms");
        node.push(item);
        node.push(XmlNode::new("Vendor").attr("x", "1"));

        let mut cache = HistogramCache::new();
        cache.load_xml(&node);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.first().unwrap().counts, vec![5, 6]);

        let written = cache.to_xml().unwrap();
        assert!(written.child("Vendor").is_some());
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let mut item = XmlNode::new("HistItem");
        item.push_text("BucketCount", "3");
        item.push_text("HistCounts", "1,2");
        assert!(HistogramEntry::from_xml(&item).is_err());
    }
}
