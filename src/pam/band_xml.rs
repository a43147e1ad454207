//! `<PAMRasterBand>` serialization.

use std::sync::Arc;

use super::band::{BandPamInfo, MaskFlags, MaskReference};
use crate::core::text::{format_f64, format_flag, parse_f64, parse_flag};
use crate::core::{AttributeTable, ColorInterp, ColorTable, Nodata};
use crate::util::{Error, Result};
use crate::xml::XmlNode;

pub(crate) const BAND_ELEMENT: &str = "PAMRasterBand";

impl BandPamInfo {
    /// Serialize the store; `None` when it holds nothing worth saving.
    pub(crate) fn to_xml(&self, number: usize) -> Option<XmlNode> {
        let mut node = XmlNode::new(BAND_ELEMENT).attr("band", number.to_string());

        if !self.description.is_empty() {
            node.push_text("Description", self.description.as_str());
        }
        if let Some(nodata) = self.nodata.to_xml() {
            node.push(nodata);
        }
        if !self.unit.is_empty() {
            node.push_text("UnitType", self.unit.as_str());
        }
        if let Some(offset) = self.offset {
            node.push_text("Offset", format_f64(offset));
        }
        if let Some(scale) = self.scale {
            node.push_text("Scale", format_f64(scale));
        }
        if self.color_interp != ColorInterp::Undefined {
            node.push_text("ColorInterp", self.color_interp.name());
        }
        if !self.category_names.is_empty() {
            let list = node.push(XmlNode::new("CategoryNames"));
            for name in &self.category_names {
                list.push_text("Category", name.as_str());
            }
        }
        if let Some(table) = &self.color_table {
            node.push(table.to_xml());
        }
        if let Some((min, max)) = self.min_max {
            node.push_text("Minimum", format_f64(min));
            node.push_text("Maximum", format_f64(max));
        }
        if let Some((mean, std_dev)) = self.mean_std_dev {
            node.push_text("Mean", format_f64(mean));
            node.push_text("StandardDeviation", format_f64(std_dev));
            if self.stats_approximate {
                node.push_text("StatisticsApproximate", format_flag(true));
            }
        }
        if let Some(histograms) = self.histograms.to_xml() {
            node.push(histograms);
        }
        if let Some(rat) = &self.rat {
            node.push(rat.to_xml());
        }
        if let Some(mask) = &self.mask {
            let mut mask_node = XmlNode::new("MaskBand").attr("flags", mask.flags.bits().to_string());
            if let Some(band) = mask.band {
                mask_node.set_attribute("band", band.to_string());
            }
            node.push(mask_node);
        }
        node.children.extend(self.metadata.to_xml());
        node.children.extend(self.other_nodes.iter().cloned());

        // only the band attribute: nothing to persist
        if node.children.is_empty() {
            None
        } else {
            Some(node)
        }
    }

    /// Parse a `<PAMRasterBand>` element.
    ///
    /// Unknown children are kept, and so are known ones whose content does
    /// not parse: they are logged and written back unchanged.
    pub(crate) fn from_xml(node: &XmlNode) -> Self {
        let mut info = Self::default();
        let mut stats = PendingStats::default();

        for child in &node.children {
            if let Err(e) = info.load_element(child, &mut stats) {
                tracing::warn!("Keeping unparsable <{}> of band as is: {e}", child.name);
                info.other_nodes.push(child.clone());
            }
        }

        info.min_max = stats.min.zip(stats.max);
        info.mean_std_dev = stats.mean.zip(stats.std_dev);
        info
    }

    fn load_element(&mut self, child: &XmlNode, stats: &mut PendingStats) -> Result<()> {
        let text = child.text();
        match child.name.as_str() {
            "Description" => self.description = text.to_string(),
            "NoDataValue" => self.nodata = Nodata::from_xml(child)?,
            "UnitType" => self.unit = text.to_string(),
            "Offset" => self.offset = Some(parse_f64("Offset", text)?),
            "Scale" => self.scale = Some(parse_f64("Scale", text)?),
            "ColorInterp" => self.color_interp = text.parse::<ColorInterp>()?,
            "CategoryNames" => {
                self.category_names = child
                    .children_named("Category")
                    .map(|c| c.text().to_string())
                    .collect();
            }
            "ColorTable" => self.color_table = Some(ColorTable::from_xml(child)?),
            "Minimum" => stats.min = Some(parse_f64("Minimum", text)?),
            "Maximum" => stats.max = Some(parse_f64("Maximum", text)?),
            "Mean" => stats.mean = Some(parse_f64("Mean", text)?),
            "StandardDeviation" => stats.std_dev = Some(parse_f64("StandardDeviation", text)?),
            "StatisticsApproximate" => {
                self.stats_approximate = parse_flag("StatisticsApproximate", text)?;
            }
            "Histograms" => self.histograms.load_xml(child),
            "GDALRasterAttributeTable" => {
                self.rat = Some(Arc::new(AttributeTable::from_xml(child)?));
            }
            "MaskBand" => self.mask = Some(mask_from_xml(child)?),
            "Metadata" => self.metadata.load_xml(child)?,
            _ => self.other_nodes.push(child.clone()),
        }
        Ok(())
    }
}

/// Statistics elements collected until the whole band is read.
#[derive(Default)]
struct PendingStats {
    min: Option<f64>,
    max: Option<f64>,
    mean: Option<f64>,
    std_dev: Option<f64>,
}

fn mask_from_xml(node: &XmlNode) -> Result<MaskReference> {
    let flags_text = node.attribute("flags").unwrap_or("0");
    let bits = flags_text
        .trim()
        .parse::<u32>()
        .map_err(|_| Error::invalid_value("MaskBand@flags", flags_text))?;
    let band = match node.attribute("band") {
        Some(text) => Some(
            text.trim()
                .parse::<usize>()
                .map_err(|_| Error::invalid_value("MaskBand@band", text))?,
        ),
        None => None,
    };
    Ok(MaskReference::new(MaskFlags::from_bits_retain(bits), band))
}

/// Band number of a `<PAMRasterBand>` element.
pub(crate) fn band_number(node: &XmlNode) -> Result<usize> {
    let text = node.attribute("band").unwrap_or("");
    match text.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::invalid_value("PAMRasterBand@band", text)),
    }
}
