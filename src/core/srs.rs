//! Spatial reference descriptor.
//!
//! The coordinate-system engine is outside this crate; a spatial reference
//! is carried as its WKT text plus the data-axis mapping and coordinate
//! epoch that sidecars persist alongside it.

use crate::core::text::{format_f64, parse_f64};
use crate::util::{Error, Result};
use crate::xml::XmlNode;

/// Opaque spatial reference.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpatialRef {
    wkt: String,
    axis_mapping: Vec<i32>,
    coordinate_epoch: Option<f64>,
}

impl SpatialRef {
    /// Create from WKT text.
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: wkt.into(),
            ..Default::default()
        }
    }

    /// Builder-style data axis to SRS axis mapping (1-based, sign = flip).
    pub fn with_axis_mapping(mut self, mapping: Vec<i32>) -> Self {
        self.axis_mapping = mapping;
        self
    }

    /// Builder-style coordinate epoch (decimal year).
    pub fn with_coordinate_epoch(mut self, epoch: f64) -> Self {
        self.coordinate_epoch = Some(epoch);
        self
    }

    /// WKT text.
    #[inline]
    pub fn wkt(&self) -> &str {
        &self.wkt
    }

    /// Data axis to SRS axis mapping; empty means "authority order".
    #[inline]
    pub fn axis_mapping(&self) -> &[i32] {
        &self.axis_mapping
    }

    /// Coordinate epoch for dynamic CRS.
    #[inline]
    pub fn coordinate_epoch(&self) -> Option<f64> {
        self.coordinate_epoch
    }

    /// Check if there is no definition.
    pub fn is_empty(&self) -> bool {
        self.wkt.trim().is_empty()
    }

    /// Same definition, ignoring whitespace differences in the WKT.
    pub fn is_same(&self, other: &SpatialRef) -> bool {
        let squash = |s: &str| s.split_whitespace().collect::<String>();
        squash(&self.wkt) == squash(&other.wkt)
            && self.axis_mapping == other.axis_mapping
            && self.coordinate_epoch.map(f64::to_bits) == other.coordinate_epoch.map(f64::to_bits)
    }

    /// Serialize as an element with the given name holding the WKT.
    pub(crate) fn to_xml(&self, name: &str) -> XmlNode {
        let mut node = XmlNode::with_text(name, self.wkt.as_str());
        self.write_attributes(&mut node, "dataAxisToSRSAxisMapping", "coordinateEpoch");
        node
    }

    /// Write axis mapping and epoch as attributes of `node`.
    pub(crate) fn write_attributes(&self, node: &mut XmlNode, mapping_key: &str, epoch_key: &str) {
        if !self.axis_mapping.is_empty() {
            let mapping: Vec<String> = self.axis_mapping.iter().map(i32::to_string).collect();
            node.set_attribute(mapping_key, mapping.join(","));
        }
        if let Some(epoch) = self.coordinate_epoch {
            node.set_attribute(epoch_key, format_f64(epoch));
        }
    }

    /// Parse an element holding WKT text; `None` for an empty definition.
    pub(crate) fn from_xml(node: &XmlNode) -> Result<Option<Self>> {
        Self::from_parts(node.text(), node, "dataAxisToSRSAxisMapping", "coordinateEpoch")
    }

    /// Build from WKT and the attributes of `node`.
    pub(crate) fn from_parts(
        wkt: &str,
        node: &XmlNode,
        mapping_key: &str,
        epoch_key: &str,
    ) -> Result<Option<Self>> {
        if wkt.trim().is_empty() {
            return Ok(None);
        }
        let mut srs = Self::from_wkt(wkt);
        if let Some(mapping) = node.attribute(mapping_key) {
            srs.axis_mapping = mapping
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<i32>().map_err(|_| Error::invalid_value(mapping_key, mapping)))
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(epoch) = node.attribute(epoch_key) {
            srs.coordinate_epoch = Some(parse_f64(epoch_key, epoch)?);
        }
        Ok(Some(srs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WGS84: &str = "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563]],PRIMEM[\"Greenwich\",0],UNIT[\"degree\",0.0174532925199433]]";

    #[test]
    fn test_xml_roundtrip() {
        let srs = SpatialRef::from_wkt(WGS84)
            .with_axis_mapping(vec![2, 1])
            .with_coordinate_epoch(2021.5);
        let node = srs.to_xml("SRS");
        assert_eq!(node.attribute("dataAxisToSRSAxisMapping"), Some("2,1"));

        let back = SpatialRef::from_xml(&node).unwrap().unwrap();
        assert_eq!(back, srs);
    }

    #[test]
    fn test_wkt_kept_verbatim() {
        let srs = SpatialRef::from_wkt(format!("\n  {WGS84} \n"));
        let back = SpatialRef::from_xml(&srs.to_xml("SRS")).unwrap().unwrap();
        assert_eq!(back.wkt(), srs.wkt());
    }

    #[test]
    fn test_empty_is_none() {
        let node = XmlNode::with_text("SRS", "   ");
        assert!(SpatialRef::from_xml(&node).unwrap().is_none());
    }

    #[test]
    fn test_is_same_ignores_whitespace() {
        let a = SpatialRef::from_wkt("LOCAL_CS[\"x\",\n  UNIT[\"m\",1]]");
        let b = SpatialRef::from_wkt("LOCAL_CS[\"x\",UNIT[\"m\",1]]");
        assert!(a.is_same(&b));
        assert!(!a.is_same(&b.clone().with_axis_mapping(vec![1, 2])));
    }

    #[test]
    fn test_bad_mapping() {
        let node = XmlNode::with_text("SRS", WGS84).attr("dataAxisToSRSAxisMapping", "1,x");
        assert!(SpatialRef::from_xml(&node).is_err());
    }
}
