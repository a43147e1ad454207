//! Dataset persistence controller.
//!
//! [`PamDataset`] owns the dataset metadata store and its bands, and drives
//! the load/save state machine:
//!
//! ```text
//! Uninitialized -> Initialized (clean) <-> Dirty -> Saved (clean)
//!                        |
//!                        +-> ReadFailed (sticky until force_load)
//! ```
//!
//! `Disabled` and `NoSave` suppress loading and/or saving for the whole
//! life of the dataset.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use super::band::PamRasterBand;
use super::dataset_info::DatasetPamInfo;
use super::sidecar;
use crate::core::{
    Gcp, GeoTransform, MetaData, PamFlagCell, PamFlags, PamParent, ProxyRegistry, SpatialRef,
};
use crate::util::{Error, PamConfig, Result};
use crate::xml::{self, XmlNode};

/// A raster dataset carrying persistent auxiliary metadata.
pub struct PamDataset {
    description: String,
    proxies: Arc<ProxyRegistry>,
    flags: Arc<PamFlagCell>,
    pub(crate) pam: Option<Box<DatasetPamInfo>>,
    pub(crate) bands: Vec<PamRasterBand>,
    /// A load completed, successfully or not.
    load_attempted: bool,
    /// Existing sidecar that failed to load; never overwritten.
    unreadable_sidecar: Option<PathBuf>,
}

impl std::fmt::Debug for PamDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PamDataset")
            .field("description", &self.description)
            .field("flags", &self.flags.get())
            .field("bands", &self.bands.len())
            .field("initialized", &self.pam.is_some())
            .finish()
    }
}

impl PamDataset {
    /// Create a dataset using the process-wide configuration and proxy registry.
    ///
    /// `description` is the resource name, normally its file path.
    pub fn new(description: impl Into<String>, band_count: usize) -> Self {
        Self::with_config(description, band_count, PamConfig::global(), ProxyRegistry::global())
    }

    /// Create a dataset with explicit configuration and proxy registry.
    pub fn with_config(
        description: impl Into<String>,
        band_count: usize,
        config: &PamConfig,
        proxies: Arc<ProxyRegistry>,
    ) -> Self {
        let initial = if config.enabled {
            PamFlags::empty()
        } else {
            PamFlags::DISABLED
        };
        let flags = Arc::new(PamFlagCell::new(initial));
        let parent = Arc::downgrade(&flags) as Weak<dyn PamParent>;
        let bands = (1..=band_count)
            .map(|n| PamRasterBand::with_parent(n, parent.clone()))
            .collect();

        Self {
            description: description.into(),
            proxies,
            flags,
            pam: None,
            bands,
            load_attempted: false,
            unreadable_sidecar: None,
        }
    }

    /// Create a dataset and load its sidecar right away.
    ///
    /// `siblings` lists the file names in the resource's directory when the
    /// caller already has them; a load failure leaves empty metadata.
    pub fn open(description: impl Into<String>, band_count: usize, siblings: Option<&[String]>) -> Self {
        let mut ds = Self::new(description, band_count);
        if let Err(e) = ds.try_load(siblings) {
            tracing::debug!("No auxiliary metadata for {}: {e}", ds.description);
        }
        ds
    }

    /// Resource name.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Proxy registry used by this dataset.
    pub fn proxies(&self) -> &Arc<ProxyRegistry> {
        &self.proxies
    }

    // ---- lifecycle

    /// Allocate the metadata store if absent. Idempotent, no I/O.
    pub fn initialize(&mut self) {
        self.info_mut();
    }

    /// Check if the metadata store has been allocated.
    pub fn is_initialized(&self) -> bool {
        self.pam.is_some()
    }

    /// Release the dataset and band stores without saving.
    pub fn clear(&mut self) {
        self.pam = None;
        for band in &mut self.bands {
            band.clear();
        }
        self.load_attempted = false;
        self.unreadable_sidecar = None;
    }

    /// Current persistence flags.
    pub fn flags(&self) -> PamFlags {
        self.flags.get()
    }

    /// Replace the persistence flags.
    pub fn set_flags(&mut self, flags: PamFlags) {
        self.flags.set(flags);
    }

    /// Record that metadata diverged from disk. No effect when disabled.
    pub fn mark_dirty(&self) {
        self.flags.mark_dirty();
    }

    /// Check whether unsaved changes exist.
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PamFlags::DIRTY)
    }

    pub(crate) fn info(&self) -> Option<&DatasetPamInfo> {
        self.pam.as_deref()
    }

    pub(crate) fn info_mut(&mut self) -> &mut DatasetPamInfo {
        self.pam.get_or_insert_with(Box::default)
    }

    /// Load once before the first mutation so that saving does not drop
    /// what the sidecar already holds.
    pub fn ensure_loaded(&mut self) {
        if self.load_attempted || self.flags.contains(PamFlags::TRIED_READ_FAILED) {
            return;
        }
        if let Err(e) = self.try_load(None) {
            tracing::debug!("Auxiliary metadata not loaded for {}: {e}", self.description);
        }
    }

    /// Load, then apply a change to the store and mark it dirty.
    fn update<R>(&mut self, f: impl FnOnce(&mut DatasetPamInfo) -> R) -> R {
        self.ensure_loaded();
        let result = f(self.info_mut());
        self.mark_dirty();
        result
    }

    // ---- naming

    /// Set the path of the file backing this dataset.
    pub fn set_physical_filename(&mut self, path: impl Into<PathBuf>) {
        self.info_mut().physical_path = Some(path.into());
    }

    /// Path of the file backing this dataset.
    pub fn physical_filename(&self) -> Option<&Path> {
        self.info().and_then(|p| p.physical_path.as_deref())
    }

    /// Name of the subdataset this dataset represents inside its file.
    pub fn set_subdataset_name(&mut self, name: impl Into<String>) {
        self.info_mut().subdataset_name = Some(name.into());
    }

    /// Subdataset name.
    pub fn subdataset_name(&self) -> Option<&str> {
        self.info().and_then(|p| p.subdataset_name.as_deref())
    }

    /// Synthesized name for a virtual dataset with no backing file.
    pub fn set_derived_dataset_name(&mut self, name: impl Into<String>) {
        self.info_mut().derived_dataset_name = Some(name.into());
    }

    /// Derived dataset name.
    pub fn derived_dataset_name(&self) -> Option<&str> {
        self.info().and_then(|p| p.derived_dataset_name.as_deref())
    }

    /// Last resolved sidecar path.
    pub fn sidecar_path(&self) -> Option<&Path> {
        self.info().and_then(|p| p.sidecar_path.as_deref())
    }

    /// Name the sidecar is derived from: physical path, derived name, or description.
    fn base_name(&self) -> Option<String> {
        let info = self.info();
        info.and_then(|p| p.physical_path.as_ref())
            .map(|p| p.to_string_lossy().into_owned())
            .or_else(|| info.and_then(|p| p.derived_dataset_name.clone()))
            .or_else(|| Some(self.description.clone()))
            .filter(|s| !s.is_empty())
    }

    /// Resolve the sidecar path for this dataset and remember it.
    ///
    /// A registered proxy wins over the natural location. With a sibling
    /// list, an existing file differing only in case is preferred.
    pub fn build_sidecar_filename(&mut self, siblings: Option<&[String]>) -> Option<PathBuf> {
        self.resolve_sidecar(siblings).map(|(path, _)| path)
    }

    /// Sidecar path, and whether it is a proxy.
    fn resolve_sidecar(&mut self, siblings: Option<&[String]>) -> Option<(PathBuf, bool)> {
        self.initialize();
        let base = self.base_name()?;

        if let Some(proxy) = self.proxies.get(Path::new(&base)) {
            self.info_mut().sidecar_path = Some(proxy.clone());
            return Some((proxy, true));
        }
        if !sidecar::can_accept_sidecar(&base) {
            return None;
        }

        let subdataset = self.info().and_then(|p| p.subdataset_name.as_deref());
        let candidate = PathBuf::from(sidecar::sidecar_name(&base, subdataset));
        let path = match siblings {
            Some(siblings) => sidecar::resolve_sibling(&candidate, siblings),
            // keep the casing found by an earlier sibling lookup
            None => self
                .info()
                .and_then(|p| p.sidecar_path.clone())
                .filter(|known| {
                    known.parent() == candidate.parent()
                        && known
                            .file_name()
                            .zip(candidate.file_name())
                            .is_some_and(|(a, b)| a.eq_ignore_ascii_case(b))
                })
                .unwrap_or(candidate),
        };
        self.info_mut().sidecar_path = Some(path.clone());
        Some((path, false))
    }

    /// Files making up this dataset: the resource and an existing sidecar.
    pub fn file_list(&mut self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        if let Some(base) = self.base_name().filter(|b| sidecar::can_accept_sidecar(b)) {
            files.push(PathBuf::from(base));
        }
        if let Some(path) = self.build_sidecar_filename(None) {
            if path.is_file() && !files.contains(&path) {
                files.push(path);
            }
        }
        files
    }

    // ---- load / save

    /// Load the sidecar into the stores.
    ///
    /// No-op when disabled or when an earlier load failed; see
    /// [`force_load`](Self::force_load). On success DIRTY is cleared; on
    /// failure TRIED_READ_FAILED is set and the in-memory state is kept.
    pub fn try_load(&mut self, siblings: Option<&[String]>) -> Result<()> {
        self.load(siblings, false)
    }

    /// Load the sidecar even if an earlier attempt failed.
    pub fn force_load(&mut self, siblings: Option<&[String]>) -> Result<()> {
        self.load(siblings, true)
    }

    #[tracing::instrument(skip_all, fields(dataset = %self.description, force = force))]
    fn load(&mut self, siblings: Option<&[String]>, force: bool) -> Result<()> {
        let flags = self.flags.get();
        if flags.contains(PamFlags::DISABLED) {
            return Ok(());
        }
        if flags.contains(PamFlags::TRIED_READ_FAILED) && !force {
            return Ok(());
        }

        let Some((path, via_proxy)) = self.resolve_sidecar(siblings) else {
            // nowhere to load from; nothing to fail on either
            self.load_attempted = true;
            return Ok(());
        };

        let parsed = self
            .read_tree(&path, via_proxy, siblings)
            .and_then(|root| match self.info() {
                Some(current) => current.from_xml(&root, self.bands.len()),
                None => DatasetPamInfo::default().from_xml(&root, self.bands.len()),
            });
        self.load_attempted = true;

        match parsed {
            Ok((info, band_infos)) => {
                self.pam = Some(Box::new(info));
                for (band, info) in self.bands.iter_mut().zip(band_infos) {
                    band.pam = info.map(Box::new);
                }
                self.unreadable_sidecar = None;
                self.flags
                    .remove(PamFlags::DIRTY | PamFlags::TRIED_READ_FAILED | PamFlags::SAVE_ATTEMPT_FAILED);
                tracing::debug!("Loaded auxiliary metadata from {}", path.display());
                Ok(())
            }
            Err(e) => {
                self.flags.insert(PamFlags::TRIED_READ_FAILED);
                if e.is_not_found() {
                    tracing::debug!("No sidecar at {}", path.display());
                    self.unreadable_sidecar = None;
                } else {
                    tracing::warn!("Ignoring unreadable sidecar {}: {e}", path.display());
                    self.unreadable_sidecar = Some(path);
                }
                Err(e)
            }
        }
    }

    fn read_tree(&self, path: &Path, via_proxy: bool, siblings: Option<&[String]>) -> Result<XmlNode> {
        if let (Some(siblings), false) = (siblings, via_proxy) {
            // the caller listed the directory: absence needs no stat
            if !sidecar::listed_in(path, siblings) {
                return Err(Error::NotFound(path.to_path_buf()));
            }
        }
        xml::read_file(path)
    }

    /// Save the stores if they changed.
    ///
    /// No-op when disabled, marked no-save, clean, or when a save already
    /// failed since the last mutation. An empty store removes the sidecar.
    /// A sidecar that exists but failed to load is left alone until a
    /// [`force_load`](Self::force_load) succeeds.
    #[tracing::instrument(skip_all, fields(dataset = %self.description))]
    pub fn try_save(&mut self) -> Result<()> {
        let flags = self.flags.get();
        if flags.intersects(PamFlags::DISABLED | PamFlags::NO_SAVE)
            || !flags.contains(PamFlags::DIRTY)
            || flags.contains(PamFlags::SAVE_ATTEMPT_FAILED)
        {
            return Ok(());
        }

        let Some((path, via_proxy)) = self.resolve_sidecar(None) else {
            tracing::debug!("No sidecar location for {:?}; metadata kept in memory", self.description);
            self.flags.insert(PamFlags::SAVE_ATTEMPT_FAILED);
            return Ok(());
        };
        if self.unreadable_sidecar.as_ref() == Some(&path) {
            tracing::warn!("Not overwriting unreadable sidecar {}", path.display());
            self.flags.insert(PamFlags::SAVE_ATTEMPT_FAILED);
            return Err(Error::WriteFailed {
                path,
                reason: "existing sidecar could not be loaded".into(),
            });
        }

        let tree = self.info().and_then(|info| info.to_xml(&self.bands));
        let result = match tree {
            Some(tree) => {
                let canonical = PathBuf::from(self.base_name().unwrap_or_default());
                sidecar::write_with_proxy(&tree, &path, &canonical, via_proxy, &self.proxies)
                    .map(|written| self.info_mut().sidecar_path = Some(written))
            }
            None => sidecar::remove_stale(&path).map(|_| ()),
        };

        match result {
            Ok(()) => {
                self.flags.remove(PamFlags::DIRTY);
                tracing::debug!("Saved auxiliary metadata for {}", self.description);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Unable to save auxiliary information: {e}");
                self.flags.insert(PamFlags::SAVE_ATTEMPT_FAILED);
                Err(e)
            }
        }
    }

    /// Save if dirty.
    pub fn flush(&mut self) -> Result<()> {
        if self.flags.contains(PamFlags::DIRTY) {
            self.try_save()
        } else {
            Ok(())
        }
    }

    // ---- dataset metadata

    /// Spatial reference of the geotransform.
    pub fn spatial_ref(&self) -> Option<&Arc<SpatialRef>> {
        self.info().and_then(|p| p.srs.as_ref())
    }

    /// Set or remove the spatial reference.
    pub fn set_spatial_ref(&mut self, srs: Option<Arc<SpatialRef>>) {
        self.update(|p| p.srs = srs.filter(|s| !s.is_empty()));
    }

    /// Affine geotransform.
    pub fn geo_transform(&self) -> Option<GeoTransform> {
        self.info().and_then(|p| p.geo_transform)
    }

    /// Set the affine geotransform.
    pub fn set_geo_transform(&mut self, gt: GeoTransform) {
        self.update(|p| p.geo_transform = Some(gt));
    }

    /// Remove the geotransform.
    pub fn delete_geo_transform(&mut self) {
        self.update(|p| p.geo_transform = None);
    }

    /// Ground control points.
    pub fn gcps(&self) -> &[Gcp] {
        self.info().map(|p| p.gcps.as_slice()).unwrap_or_default()
    }

    /// Spatial reference of the GCPs.
    pub fn gcp_spatial_ref(&self) -> Option<&Arc<SpatialRef>> {
        self.info().and_then(|p| p.gcp_srs.as_ref())
    }

    /// Replace the GCPs and their spatial reference.
    pub fn set_gcps(&mut self, gcps: Vec<Gcp>, srs: Option<Arc<SpatialRef>>) {
        self.update(|p| {
            p.gcps = gcps;
            p.gcp_srs = srs.filter(|s| !s.is_empty());
        });
    }

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

    /// Drop statistics and histograms of every band.
    pub fn clear_statistics(&mut self) {
        self.ensure_loaded();
        for band in &mut self.bands {
            band.clear_statistics();
        }
    }

    // ---- bands

    /// Number of bands.
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Band by number (1-based).
    pub fn band(&self, number: usize) -> Result<&PamRasterBand> {
        let count = self.bands.len();
        number
            .checked_sub(1)
            .and_then(|i| self.bands.get(i))
            .ok_or(Error::BandOutOfRange { index: number, count })
    }

    /// Mutable band by number (1-based). Loads the sidecar on first use.
    pub fn band_mut(&mut self, number: usize) -> Result<&mut PamRasterBand> {
        self.ensure_loaded();
        let count = self.bands.len();
        number
            .checked_sub(1)
            .and_then(|i| self.bands.get_mut(i))
            .ok_or(Error::BandOutOfRange { index: number, count })
    }

    /// Iterate bands in order.
    pub fn bands(&self) -> impl Iterator<Item = &PamRasterBand> {
        self.bands.iter()
    }
}

impl Drop for PamDataset {
    fn drop(&mut self) {
        // failures were already reported by try_save
        let _ = self.flush();
    }
}
