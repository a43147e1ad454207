//! Georeferencing: affine geotransform and ground control points.

use std::sync::Arc;

use crate::core::srs::SpatialRef;
use crate::core::text::{format_f64, format_f64_list, parse_f64, parse_f64_list};
use crate::util::{Error, Result};
use crate::xml::XmlNode;

/// Six-parameter affine transform from pixel/line to georeferenced space.
///
/// ```text
/// x = gt[0] + pixel * gt[1] + line * gt[2]
/// y = gt[3] + pixel * gt[4] + line * gt[5]
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl Default for GeoTransform {
    /// The identity transform (north-up, unit pixels, origin at 0,0).
    fn default() -> Self {
        Self([0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }
}

impl GeoTransform {
    /// Create from the six coefficients.
    pub fn new(coefficients: [f64; 6]) -> Self {
        Self(coefficients)
    }

    /// Coefficients as an array.
    #[inline]
    pub fn coefficients(&self) -> &[f64; 6] {
        &self.0
    }

    /// Bitwise equality (distinguishes -0.0 and NaN payloads).
    pub fn bit_eq(&self, other: &GeoTransform) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a.to_bits() == b.to_bits())
    }

    /// Text form: six comma-separated doubles.
    pub fn to_text(&self) -> String {
        format_f64_list(&self.0)
    }

    /// Parse six comma-separated doubles.
    pub fn parse(text: &str) -> Result<Self> {
        let values = parse_f64_list("GeoTransform", text, &[','])?;
        let coefficients: [f64; 6] = values
            .try_into()
            .map_err(|_| Error::invalid_value("GeoTransform", text))?;
        Ok(Self(coefficients))
    }
}

/// Ground control point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Gcp {
    pub id: String,
    pub info: String,
    pub pixel: f64,
    pub line: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Gcp {
    /// Create a GCP with empty id/info.
    pub fn new(pixel: f64, line: f64, x: f64, y: f64, z: f64) -> Self {
        Self {
            pixel,
            line,
            x,
            y,
            z,
            ..Default::default()
        }
    }

    /// Builder-style identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    fn to_xml(&self) -> XmlNode {
        XmlNode::new("GCP")
            .attr("Id", self.id.as_str())
            .attr("Info", self.info.as_str())
            .attr("Pixel", format_f64(self.pixel))
            .attr("Line", format_f64(self.line))
            .attr("X", format_f64(self.x))
            .attr("Y", format_f64(self.y))
            .attr("Z", format_f64(self.z))
    }

    fn from_xml(node: &XmlNode) -> Result<Self> {
        let num = |key: &str| parse_f64(key, node.attribute(key).unwrap_or("0"));
        Ok(Self {
            id: node.attribute("Id").unwrap_or("").to_string(),
            info: node.attribute("Info").unwrap_or("").to_string(),
            pixel: num("Pixel")?,
            line: num("Line")?,
            x: num("X")?,
            y: num("Y")?,
            z: num("Z")?,
        })
    }
}

/// Serialize GCPs and their spatial reference into a `<GCPList>` element.
pub(crate) fn gcp_list_to_xml(gcps: &[Gcp], srs: Option<&SpatialRef>) -> XmlNode {
    let mut list = XmlNode::new("GCPList");
    if let Some(srs) = srs.filter(|s| !s.is_empty()) {
        list.set_attribute("Projection", srs.wkt());
        srs.write_attributes(&mut list, "dataAxisToSRSAxisMapping", "coordinateEpoch");
    }
    for gcp in gcps {
        list.push(gcp.to_xml());
    }
    list
}

/// Parse a `<GCPList>` element.
pub(crate) fn gcp_list_from_xml(list: &XmlNode) -> Result<(Vec<Gcp>, Option<Arc<SpatialRef>>)> {
    let srs = SpatialRef::from_parts(
        list.attribute("Projection").unwrap_or(""),
        list,
        "dataAxisToSRSAxisMapping",
        "coordinateEpoch",
    )?
    .map(Arc::new);
    let gcps = list
        .children_named("GCP")
        .map(Gcp::from_xml)
        .collect::<Result<Vec<_>>>()?;
    Ok((gcps, srs))
}
