//! Color interpretation and color tables.

use std::fmt;
use std::str::FromStr;

use crate::util::{Error, Result};
use crate::xml::XmlNode;

/// How the values of a band are to be interpreted as color.
///
/// Besides display models this covers spectral bands of multispectral
/// sensors and SAR frequency bands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorInterp {
    #[default]
    Undefined,
    Gray,
    Palette,
    Red,
    Green,
    Blue,
    Alpha,
    Hue,
    Saturation,
    Lightness,
    Cyan,
    Magenta,
    Yellow,
    Black,
    YCbCrY,
    YCbCrCb,
    YCbCrCr,
    // spectral
    Pan,
    Coastal,
    RedEdge,
    Nir,
    Swir,
    Mwir,
    Lwir,
    Tir,
    OtherIr,
    IrReserved1,
    IrReserved2,
    IrReserved3,
    IrReserved4,
    // radar
    SarKa,
    SarK,
    SarKu,
    SarX,
    SarC,
    SarS,
    SarL,
    SarP,
    SarReserved1,
    SarReserved2,
}

impl ColorInterp {
    const ALL: [ColorInterp; 40] = [
        Self::Undefined,
        Self::Gray,
        Self::Palette,
        Self::Red,
        Self::Green,
        Self::Blue,
        Self::Alpha,
        Self::Hue,
        Self::Saturation,
        Self::Lightness,
        Self::Cyan,
        Self::Magenta,
        Self::Yellow,
        Self::Black,
        Self::YCbCrY,
        Self::YCbCrCb,
        Self::YCbCrCr,
        Self::Pan,
        Self::Coastal,
        Self::RedEdge,
        Self::Nir,
        Self::Swir,
        Self::Mwir,
        Self::Lwir,
        Self::Tir,
        Self::OtherIr,
        Self::IrReserved1,
        Self::IrReserved2,
        Self::IrReserved3,
        Self::IrReserved4,
        Self::SarKa,
        Self::SarK,
        Self::SarKu,
        Self::SarX,
        Self::SarC,
        Self::SarS,
        Self::SarL,
        Self::SarP,
        Self::SarReserved1,
        Self::SarReserved2,
    ];

    /// Name as written to sidecars.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Undefined => "Undefined",
            Self::Gray => "Gray",
            Self::Palette => "Palette",
            Self::Red => "Red",
            Self::Green => "Green",
            Self::Blue => "Blue",
            Self::Alpha => "Alpha",
            Self::Hue => "Hue",
            Self::Saturation => "Saturation",
            Self::Lightness => "Lightness",
            Self::Cyan => "Cyan",
            Self::Magenta => "Magenta",
            Self::Yellow => "Yellow",
            Self::Black => "Black",
            Self::YCbCrY => "YCbCr_Y",
            Self::YCbCrCb => "YCbCr_Cb",
            Self::YCbCrCr => "YCbCr_Cr",
            Self::Pan => "Pan",
            Self::Coastal => "Coastal",
            Self::RedEdge => "RedEdge",
            Self::Nir => "NIR",
            Self::Swir => "SWIR",
            Self::Mwir => "MWIR",
            Self::Lwir => "LWIR",
            Self::Tir => "TIR",
            Self::OtherIr => "OtherIR",
            Self::IrReserved1 => "IR_Reserved_1",
            Self::IrReserved2 => "IR_Reserved_2",
            Self::IrReserved3 => "IR_Reserved_3",
            Self::IrReserved4 => "IR_Reserved_4",
            Self::SarKa => "SAR_Ka",
            Self::SarK => "SAR_K",
            Self::SarKu => "SAR_Ku",
            Self::SarX => "SAR_X",
            Self::SarC => "SAR_C",
            Self::SarS => "SAR_S",
            Self::SarL => "SAR_L",
            Self::SarP => "SAR_P",
            Self::SarReserved1 => "SAR_Reserved_1",
            Self::SarReserved2 => "SAR_Reserved_2",
        }
    }

    /// Look up a name like [`FromStr`], mapping unknown names to `Undefined`.
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl fmt::Display for ColorInterp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColorInterp {
    type Err = Error;

    /// Case-insensitive; "Grey" is accepted for `Gray`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("grey") {
            return Ok(Self::Gray);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|ci| ci.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::invalid_value("ColorInterp", s))
    }
}

/// One palette entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ColorEntry {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ColorEntry {
    /// Create an entry.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque entry.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// Ordered palette of RGBA entries indexed by pixel value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColorTable {
    entries: Vec<ColorEntry>,
}

impl ColorTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for a pixel value.
    pub fn get(&self, index: usize) -> Option<&ColorEntry> {
        self.entries.get(index)
    }

    /// Set an entry, growing the table with transparent black as needed.
    pub fn set(&mut self, index: usize, entry: ColorEntry) {
        if index >= self.entries.len() {
            self.entries.resize(index + 1, ColorEntry::default());
        }
        self.entries[index] = entry;
    }

    /// Append an entry.
    pub fn push(&mut self, entry: ColorEntry) {
        self.entries.push(entry);
    }

    /// All entries.
    pub fn entries(&self) -> &[ColorEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("ColorTable");
        for e in &self.entries {
            node.push(
                XmlNode::new("Entry")
                    .attr("c1", e.r.to_string())
                    .attr("c2", e.g.to_string())
                    .attr("c3", e.b.to_string())
                    .attr("c4", e.a.to_string()),
            );
        }
        node
    }

    pub(crate) fn from_xml(node: &XmlNode) -> Result<Self> {
        let component = |entry: &XmlNode, key: &str, default: &str| -> Result<u8> {
            let text = entry.attribute(key).unwrap_or(default);
            text.trim()
                .parse::<u8>()
                .map_err(|_| Error::invalid_value(format!("ColorTable/Entry@{key}"), text))
        };
        let mut table = Self::new();
        for entry in node.children_named("Entry") {
            table.push(ColorEntry {
                r: component(entry, "c1", "0")?,
                g: component(entry, "c2", "0")?,
                b: component(entry, "c3", "0")?,
                a: component(entry, "c4", "255")?,
            });
        }
        Ok(table)
    }
}

impl FromIterator<ColorEntry> for ColorTable {
    fn from_iter<T: IntoIterator<Item = ColorEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
