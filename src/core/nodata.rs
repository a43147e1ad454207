//! Multi-typed nodata value.
//!
//! A band's nodata sentinel can be a double or, for 64-bit integer bands, an
//! exact signed or unsigned integer that a double cannot represent. Exactly
//! one representation is active; setting one replaces the others.

use crate::core::text::{format_f64, parse_f64, parse_i64, parse_u64};
use crate::util::{Error, Result};
use crate::xml::XmlNode;

/// Value reported by [`Nodata::double`] when no double is active.
pub const DEFAULT_NODATA: f64 = 0.0;
/// Value reported by [`Nodata::int64`] when no signed integer is active.
pub const DEFAULT_NODATA_INT64: i64 = i64::MIN;
/// Value reported by [`Nodata::uint64`] when no unsigned integer is active.
pub const DEFAULT_NODATA_UINT64: u64 = u64::MAX;

/// Nodata cell: unset or exactly one typed value.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Nodata {
    #[default]
    Unset,
    Double(f64),
    Int64(i64),
    UInt64(u64),
}

impl Nodata {
    /// Check if any representation is set.
    #[inline]
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Make a double the active representation.
    pub fn set_double(&mut self, value: f64) {
        *self = Self::Double(value);
    }

    /// Make a signed integer the active representation.
    pub fn set_int64(&mut self, value: i64) {
        *self = Self::Int64(value);
    }

    /// Make an unsigned integer the active representation.
    pub fn set_uint64(&mut self, value: u64) {
        *self = Self::UInt64(value);
    }

    /// Clear all representations.
    pub fn clear(&mut self) {
        *self = Self::Unset;
    }

    /// Double view: `(value, true)` if a double is active, else `(0.0, false)`.
    pub fn double(&self) -> (f64, bool) {
        match *self {
            Self::Double(v) => (v, true),
            _ => (DEFAULT_NODATA, false),
        }
    }

    /// Signed view: `(value, true)` if a signed integer is active, else `(i64::MIN, false)`.
    pub fn int64(&self) -> (i64, bool) {
        match *self {
            Self::Int64(v) => (v, true),
            _ => (DEFAULT_NODATA_INT64, false),
        }
    }

    /// Unsigned view: `(value, true)` if an unsigned integer is active, else `(u64::MAX, false)`.
    pub fn uint64(&self) -> (u64, bool) {
        match *self {
            Self::UInt64(v) => (v, true),
            _ => (DEFAULT_NODATA_UINT64, false),
        }
    }

    /// Double value if that representation is active.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        let (v, ok) = self.double();
        ok.then_some(v)
    }

    /// Signed value if that representation is active.
    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        let (v, ok) = self.int64();
        ok.then_some(v)
    }

    /// Unsigned value if that representation is active.
    #[inline]
    pub fn as_u64(&self) -> Option<u64> {
        let (v, ok) = self.uint64();
        ok.then_some(v)
    }

    /// Name of the active representation as written to sidecars.
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            Self::Unset => None,
            Self::Double(_) => Some("Float64"),
            Self::Int64(_) => Some("Int64"),
            Self::UInt64(_) => Some("UInt64"),
        }
    }

    /// Same active representation and same bits (NaN equals NaN).
    pub fn same_as(&self, other: &Nodata) -> bool {
        match (self, other) {
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }

    /// Serialize to a `<NoDataValue>` element; `None` when unset.
    ///
    /// NaN payloads are kept through an `le_hex_equiv` attribute holding the
    /// little-endian bytes of the double.
    pub(crate) fn to_xml(&self) -> Option<XmlNode> {
        let type_name = self.type_name()?;
        let text = match *self {
            Self::Double(v) => format_f64(v),
            Self::Int64(v) => v.to_string(),
            Self::UInt64(v) => v.to_string(),
            Self::Unset => return None,
        };
        let mut node = XmlNode::with_text("NoDataValue", text);
        if type_name != "Float64" {
            node.set_attribute("type", type_name);
        }
        if let Self::Double(v) = *self {
            if v.is_nan() {
                node.set_attribute("le_hex_equiv", to_hex(&v.to_le_bytes()));
            }
        }
        Some(node)
    }

    /// Parse a `<NoDataValue>` element.
    pub(crate) fn from_xml(node: &XmlNode) -> Result<Self> {
        let text = node.text();
        match node.attribute("type").unwrap_or("Float64") {
            "Int64" => Ok(Self::Int64(parse_i64("NoDataValue", text)?)),
            "UInt64" => Ok(Self::UInt64(parse_u64("NoDataValue", text)?)),
            "Float64" => {
                if let Some(hex) = node.attribute("le_hex_equiv") {
                    if let Some(bytes) = from_hex::<8>(hex) {
                        return Ok(Self::Double(f64::from_le_bytes(bytes)));
                    }
                }
                Ok(Self::Double(parse_f64("NoDataValue", text)?))
            }
            other => Err(Error::invalid_value("NoDataValue@type", other)),
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn from_hex<const N: usize>(hex: &str) -> Option<[u8; N]> {
    if hex.len() != N * 2 || !hex.is_ascii() {
        return None;
    }
    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusivity() {
        let mut nd = Nodata::default();
        assert!(!nd.is_set());
        assert_eq!(nd.double(), (0.0, false));

        nd.set_int64(-9999);
        assert_eq!(nd.double(), (DEFAULT_NODATA, false));
        assert_eq!(nd.int64(), (-9999, true));
        assert_eq!(nd.uint64(), (u64::MAX, false));

        nd.set_uint64(7);
        assert_eq!(nd.int64(), (i64::MIN, false));
        assert_eq!(nd.as_u64(), Some(7));

        nd.set_double(-1.5);
        assert_eq!(nd.as_f64(), Some(-1.5));
        assert_eq!(nd.as_u64(), None);

        nd.clear();
        assert_eq!(nd, Nodata::Unset);
    }

    #[test]
    fn test_sentinel_can_be_real_value() {
        let mut nd = Nodata::default();
        nd.set_int64(i64::MIN);
        assert_eq!(nd.int64(), (i64::MIN, true));
    }

    #[test]
    fn test_xml_types() {
        let node = Nodata::Int64(-9999).to_xml().unwrap();
        assert_eq!(node.attribute("type"), Some("Int64"));
        assert_eq!(Nodata::from_xml(&node).unwrap(), Nodata::Int64(-9999));

        let node = Nodata::UInt64(u64::MAX).to_xml().unwrap();
        assert_eq!(Nodata::from_xml(&node).unwrap(), Nodata::UInt64(u64::MAX));

        let node = Nodata::Double(-3.4e38).to_xml().unwrap();
        assert_eq!(node.attribute("type"), None);
        assert_eq!(Nodata::from_xml(&node).unwrap(), Nodata::Double(-3.4e38));

        assert!(Nodata::Unset.to_xml().is_none());
    }

    #[test]
    fn test_nan_payload_preserved() {
        let payload = f64::from_bits(0x7FF8_0000_0000_1234);
        let node = Nodata::Double(payload).to_xml().unwrap();
        assert!(node.attribute("le_hex_equiv").is_some());
        let back = Nodata::from_xml(&node).unwrap();
        assert!(back.same_as(&Nodata::Double(payload)));
    }

    #[test]
    fn test_bad_type() {
        let node = XmlNode::with_text("NoDataValue", "1").attr("type", "Complex");
        assert!(Nodata::from_xml(&node).is_err());
    }
}
