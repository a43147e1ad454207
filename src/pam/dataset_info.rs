//! Dataset metadata store and its `<PAMDataset>` serialization.

use std::path::PathBuf;
use std::sync::Arc;

use super::band::{BandPamInfo, PamRasterBand};
use super::band_xml::{band_number, BAND_ELEMENT};
use crate::core::{gcp_list_from_xml, gcp_list_to_xml, Gcp, GeoTransform, MetadataDomains, SpatialRef};
use crate::util::{Error, Result};
use crate::xml::XmlNode;

/// Root element of a sidecar document.
pub(crate) const ROOT_ELEMENT: &str = "PAMDataset";

/// Dataset-level metadata plus sidecar bookkeeping.
#[derive(Clone, Debug, Default)]
pub(crate) struct DatasetPamInfo {
    pub srs: Option<Arc<SpatialRef>>,
    pub geo_transform: Option<GeoTransform>,
    pub gcp_srs: Option<Arc<SpatialRef>>,
    pub gcps: Vec<Gcp>,
    pub metadata: MetadataDomains,

    /// Last resolved sidecar location.
    pub sidecar_path: Option<PathBuf>,
    pub physical_path: Option<PathBuf>,
    pub subdataset_name: Option<String>,
    pub derived_dataset_name: Option<String>,

    /// Unrecognized elements, written back untouched.
    pub other_nodes: Vec<XmlNode>,
}

impl DatasetPamInfo {
    /// Fresh store keeping only the naming bookkeeping of `self`.
    pub fn reset_content(&self) -> Self {
        Self {
            sidecar_path: self.sidecar_path.clone(),
            physical_path: self.physical_path.clone(),
            subdataset_name: self.subdataset_name.clone(),
            derived_dataset_name: self.derived_dataset_name.clone(),
            ..Default::default()
        }
    }

    /// Serialize the dataset and its bands; `None` when nothing needs saving.
    pub fn to_xml(&self, bands: &[PamRasterBand]) -> Option<XmlNode> {
        let mut root = XmlNode::new(ROOT_ELEMENT);

        if let Some(srs) = self.srs.as_deref().filter(|s| !s.is_empty()) {
            root.push(srs.to_xml("SRS"));
        }
        if let Some(gt) = &self.geo_transform {
            root.push_text("GeoTransform", gt.to_text());
        }
        root.children.extend(self.metadata.to_xml());
        // an SRS alone is kept as an empty list
        if !self.gcps.is_empty() || self.gcp_srs.is_some() {
            root.push(gcp_list_to_xml(&self.gcps, self.gcp_srs.as_deref()));
        }
        for band in bands {
            if let Some(node) = band.pam.as_deref().and_then(|p| p.to_xml(band.number())) {
                root.push(node);
            }
        }
        root.children.extend(self.other_nodes.iter().cloned());

        if root.children.is_empty() {
            None
        } else {
            Some(root)
        }
    }

    /// Parse a sidecar tree into a store and per-band stores.
    ///
    /// Only a foreign root element fails the load. Band elements numbered
    /// beyond `band_count` and elements whose content does not parse are
    /// kept as unknown nodes so a rewrite does not lose them.
    pub fn from_xml(
        &self,
        root: &XmlNode,
        band_count: usize,
    ) -> Result<(Self, Vec<Option<BandPamInfo>>)> {
        if root.name != ROOT_ELEMENT {
            return Err(Error::parse(format!(
                "root element is <{}>, expected <{ROOT_ELEMENT}>",
                root.name
            )));
        }

        let mut info = self.reset_content();
        let mut bands: Vec<Option<BandPamInfo>> = vec![None; band_count];

        for child in &root.children {
            if let Err(e) = info.load_element(child, &mut bands) {
                tracing::warn!("Keeping unparsable <{}> as is: {e}", child.name);
                info.other_nodes.push(child.clone());
            }
        }

        Ok((info, bands))
    }

    fn load_element(&mut self, child: &XmlNode, bands: &mut [Option<BandPamInfo>]) -> Result<()> {
        match child.name.as_str() {
            "SRS" => self.srs = SpatialRef::from_xml(child)?.map(Arc::new),
            "GeoTransform" => self.geo_transform = Some(GeoTransform::parse(child.text())?),
            "Metadata" => self.metadata.load_xml(child)?,
            "GCPList" => {
                let (gcps, srs) = gcp_list_from_xml(child)?;
                self.gcps = gcps;
                self.gcp_srs = srs;
            }
            BAND_ELEMENT => {
                let number = band_number(child)?;
                match bands.get_mut(number - 1) {
                    Some(slot) => *slot = Some(BandPamInfo::from_xml(child)),
                    None => {
                        tracing::debug!("Keeping metadata of band {number} beyond band count {}", bands.len());
                        self.other_nodes.push(child.clone());
                    }
                }
            }
            _ => self.other_nodes.push(child.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml;

    #[test]
    fn test_empty_store_has_no_tree() {
        assert!(DatasetPamInfo::default().to_xml(&[]).is_none());
        let bands = vec![PamRasterBand::new(1)];
        assert!(DatasetPamInfo::default().to_xml(&bands).is_none());
    }

    #[test]
    fn test_roundtrip_with_unknown_nodes() {
        let mut info = DatasetPamInfo::default();
        info.srs = Some(Arc::new(SpatialRef::from_wkt("LOCAL_CS[\"x\"]")));
        info.geo_transform = Some(GeoTransform::new([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]));
        info.gcps = vec![Gcp::new(1.0, 2.0, 3.0, 4.0, 5.0)];
        info.metadata.set_item("A", Some("1"), "");
        info.other_nodes.push(XmlNode::with_text("Extra", "payload").attr("v", "2"));

        let mut bands = vec![PamRasterBand::new(1), PamRasterBand::new(2)];
        bands[1].set_unit_type("ft");

        let root = info.to_xml(&bands).unwrap();
        let text = xml::to_string(&root).unwrap();
        let parsed = xml::parse_str(&text).unwrap();

        let (back, band_infos) = DatasetPamInfo::default().from_xml(&parsed, 2).unwrap();
        assert_eq!(back.srs, info.srs);
        assert_eq!(back.geo_transform, info.geo_transform);
        assert_eq!(back.gcps, info.gcps);
        assert_eq!(back.metadata.item("A", ""), Some("1"));
        assert_eq!(back.other_nodes, info.other_nodes);
        assert!(band_infos[0].is_none());
        assert_eq!(band_infos[1].as_ref().unwrap().unit, "ft");
    }

    #[test]
    fn test_extra_band_preserved() {
        let parsed = xml::parse_str(
            "<PAMDataset><PAMRasterBand band=\"5\"><UnitType>m</UnitType></PAMRasterBand></PAMDataset>",
        )
        .unwrap();
        let (back, bands) = DatasetPamInfo::default().from_xml(&parsed, 1).unwrap();
        assert!(bands[0].is_none());
        assert_eq!(back.other_nodes.len(), 1);
        assert_eq!(back.other_nodes[0].attribute("band"), Some("5"));
    }

    #[test]
    fn test_bad_elements_do_not_fail_the_load() {
        let parsed = xml::parse_str(
            "<PAMDataset><GeoTransform>1,2,3</GeoTransform><SRS>LOCAL_CS[\"x\"]</SRS>\
             <PAMRasterBand band=\"zero\"><UnitType>m</UnitType></PAMRasterBand>\
             <PAMRasterBand band=\"1\"><ColorInterp>Ultraviolet</ColorInterp><UnitType>ft</UnitType></PAMRasterBand>\
             </PAMDataset>",
        )
        .unwrap();
        let (back, bands) = DatasetPamInfo::default().from_xml(&parsed, 1).unwrap();
        assert!(back.geo_transform.is_none());
        assert_eq!(back.srs.as_deref().map(SpatialRef::wkt), Some("LOCAL_CS[\"x\"]"));
        let kept: Vec<_> = back.other_nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(kept, vec!["GeoTransform", BAND_ELEMENT]);
        assert_eq!(bands[0].as_ref().unwrap().unit, "ft");
    }

    #[test]
    fn test_gcp_srs_without_gcps_survives() {
        let mut info = DatasetPamInfo::default();
        info.gcp_srs = Some(Arc::new(SpatialRef::from_wkt("LOCAL_CS[\"gcp\"]")));
        let root = info.to_xml(&[]).unwrap();
        let (back, _) = DatasetPamInfo::default().from_xml(&root, 0).unwrap();
        assert!(back.gcps.is_empty());
        assert_eq!(back.gcp_srs, info.gcp_srs);
    }

    #[test]
    fn test_wrong_root() {
        let parsed = xml::parse_str("<Other/>").unwrap();
        assert!(matches!(
            DatasetPamInfo::default().from_xml(&parsed, 0),
            Err(Error::Parse { .. })
        ));
    }
}
