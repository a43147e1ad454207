//! Per-file metadata store for multidimensional arrays.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::{Mutex, MutexGuard};

use crate::core::text::{format_f64, format_flag, parse_f64, parse_flag, parse_u64};
use crate::core::{ProxyRegistry, SpatialRef};
use crate::pam::{remove_stale, write_with_proxy, SIDECAR_SUFFIX};
use crate::util::{Error, PamConfig, Result};
use crate::xml::{self, XmlNode};

/// Statistics of one array.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArrayStatistics {
    pub approximate: bool,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub valid_count: u64,
}

impl ArrayStatistics {
    fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("Statistics");
        node.push_text("ApproxStats", format_flag(self.approximate));
        node.push_text("Minimum", format_f64(self.min));
        node.push_text("Maximum", format_f64(self.max));
        node.push_text("Mean", format_f64(self.mean));
        node.push_text("StdDev", format_f64(self.std_dev));
        node.push_text("ValidSampleCount", self.valid_count.to_string());
        node
    }

    fn from_xml(node: &XmlNode) -> Result<Self> {
        let num = |name: &str| parse_f64(name, node.child_text(name).unwrap_or("0"));
        Ok(Self {
            approximate: parse_flag("ApproxStats", node.child_text("ApproxStats").unwrap_or("0"))?,
            min: num("Minimum")?,
            max: num("Maximum")?,
            mean: num("Mean")?,
            std_dev: num("StdDev")?,
            valid_count: parse_u64(
                "ValidSampleCount",
                node.child_text("ValidSampleCount").unwrap_or("0"),
            )?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ArrayKey {
    full_name: String,
    context: String,
}

impl ArrayKey {
    fn new(full_name: &str, context: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            context: context.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct ArrayInfo {
    srs: Option<Arc<SpatialRef>>,
    statistics: Option<ArrayStatistics>,
}

impl ArrayInfo {
    fn is_empty(&self) -> bool {
        self.srs.is_none() && self.statistics.is_none()
    }
}

#[derive(Debug, Default)]
struct State {
    loaded: bool,
    dirty: bool,
    arrays: BTreeMap<ArrayKey, ArrayInfo>,
    other_nodes: Vec<XmlNode>,
}

impl State {
    fn update(&mut self, key: ArrayKey, f: impl FnOnce(&mut ArrayInfo)) {
        let info = self.arrays.entry(key.clone()).or_default();
        f(info);
        if info.is_empty() {
            self.arrays.remove(&key);
        }
        self.dirty = true;
    }

    fn to_xml(&self) -> Option<XmlNode> {
        let mut root = XmlNode::new("PAMDataset");
        for (key, info) in &self.arrays {
            if info.is_empty() {
                continue;
            }
            let array = root.push(XmlNode::new("Array").attr("name", key.full_name.as_str()));
            if !key.context.is_empty() {
                array.set_attribute("context", key.context.as_str());
            }
            if let Some(srs) = info.srs.as_deref().filter(|s| !s.is_empty()) {
                array.push(srs.to_xml("SRS"));
            }
            if let Some(stats) = &info.statistics {
                array.push(stats.to_xml());
            }
        }
        root.children.extend(self.other_nodes.iter().cloned());
        (!root.children.is_empty()).then_some(root)
    }

    fn load_xml(&mut self, root: &XmlNode) -> Result<()> {
        if root.name != "PAMDataset" {
            return Err(Error::parse(format!("root element is <{}>, expected <PAMDataset>", root.name)));
        }
        let mut arrays = BTreeMap::new();
        let mut other_nodes = Vec::new();
        for child in &root.children {
            let name = child.attribute("name").filter(|_| child.name == "Array");
            let Some(name) = name else {
                other_nodes.push(child.clone());
                continue;
            };
            let key = ArrayKey::new(name, child.attribute("context").unwrap_or(""));
            let info = ArrayInfo {
                srs: match child.child("SRS") {
                    Some(node) => SpatialRef::from_xml(node)?.map(Arc::new),
                    None => None,
                },
                statistics: child.child("Statistics").map(ArrayStatistics::from_xml).transpose()?,
            };
            arrays.insert(key, info);
        }
        self.arrays = arrays;
        self.other_nodes = other_nodes;
        Ok(())
    }
}

/// Metadata of every array of one backing file.
///
/// One instance exists per file while anyone holds it; obtain it through
/// [`PamMultiDim::get_pam`]. The sidecar is read on first access and
/// written on [`flush`](Self::flush) and when the last holder drops it.
#[derive(Debug)]
pub struct PamMultiDim {
    shared: Arc<Shared>,
}

/// State of one file, outliving the handle while its final save runs.
#[derive(Debug)]
struct Shared {
    filename: PathBuf,
    enabled: bool,
    proxies: Arc<ProxyRegistry>,
    state: Mutex<State>,
}

/// Registry entry. `shared` stays upgradable until a dropped handle has
/// finished writing, so a new holder picks up the same state.
struct Entry {
    handle: Weak<PamMultiDim>,
    shared: Weak<Shared>,
}

static STORES: LazyLock<Mutex<HashMap<PathBuf, Entry>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

impl PamMultiDim {
    /// Shared store for `owner_file`, using the process-wide configuration.
    pub fn get_pam(owner_file: impl AsRef<Path>) -> Arc<PamMultiDim> {
        Self::get_pam_with(owner_file, PamConfig::global(), ProxyRegistry::global())
    }

    /// Shared store for `owner_file`.
    ///
    /// `config` and `proxies` apply only when the store is created; a store
    /// already alive for the file is returned as is.
    pub fn get_pam_with(
        owner_file: impl AsRef<Path>,
        config: &PamConfig,
        proxies: Arc<ProxyRegistry>,
    ) -> Arc<PamMultiDim> {
        let filename = owner_file.as_ref().to_path_buf();
        let mut stores = STORES.lock();
        if let Some(entry) = stores.get(&filename) {
            if let Some(existing) = entry.handle.upgrade() {
                return existing;
            }
            if let Some(shared) = entry.shared.upgrade() {
                // previous holder is still saving
                let store = Arc::new(PamMultiDim { shared });
                stores.insert(
                    filename,
                    Entry {
                        handle: Arc::downgrade(&store),
                        shared: Arc::downgrade(&store.shared),
                    },
                );
                return store;
            }
        }
        stores.retain(|_, entry| entry.shared.strong_count() > 0);

        let store = Arc::new(PamMultiDim {
            shared: Arc::new(Shared {
                filename: filename.clone(),
                enabled: config.enabled,
                proxies,
                state: Mutex::new(State::default()),
            }),
        });
        stores.insert(
            filename,
            Entry {
                handle: Arc::downgrade(&store),
                shared: Arc::downgrade(&store.shared),
            },
        );
        store
    }

    /// Backing file.
    pub fn filename(&self) -> &Path {
        &self.shared.filename
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.state()
    }

    /// Spatial reference of an array.
    pub fn spatial_ref(&self, full_name: &str, context: &str) -> Option<Arc<SpatialRef>> {
        self.state()
            .arrays
            .get(&ArrayKey::new(full_name, context))
            .and_then(|info| info.srs.clone())
    }

    /// Set or remove the spatial reference of an array.
    pub fn set_spatial_ref(&self, full_name: &str, context: &str, srs: Option<Arc<SpatialRef>>) {
        let srs = srs.filter(|s| !s.is_empty());
        self.state()
            .update(ArrayKey::new(full_name, context), |info| info.srs = srs);
    }

    /// Statistics of an array. Approximate statistics are returned only
    /// when `approx_ok` is set.
    pub fn statistics(&self, full_name: &str, context: &str, approx_ok: bool) -> Option<ArrayStatistics> {
        self.state()
            .arrays
            .get(&ArrayKey::new(full_name, context))
            .and_then(|info| info.statistics)
            .filter(|stats| approx_ok || !stats.approximate)
    }

    /// Store statistics of an array.
    pub fn set_statistics(&self, full_name: &str, context: &str, stats: ArrayStatistics) {
        self.state()
            .update(ArrayKey::new(full_name, context), |info| info.statistics = Some(stats));
    }

    /// Remove statistics of one array.
    pub fn clear_array_statistics(&self, full_name: &str, context: &str) {
        let mut state = self.state();
        let key = ArrayKey::new(full_name, context);
        if state.arrays.get(&key).is_some_and(|info| info.statistics.is_some()) {
            state.update(key, |info| info.statistics = None);
        }
    }

    /// Remove statistics of every array of the file.
    pub fn clear_statistics(&self) {
        let mut state = self.state();
        let mut changed = false;
        for info in state.arrays.values_mut() {
            changed |= info.statistics.take().is_some();
        }
        if changed {
            state.arrays.retain(|_, info| !info.is_empty());
            state.dirty = true;
        }
    }

    /// Check whether unsaved changes exist.
    pub fn is_dirty(&self) -> bool {
        self.shared.state.lock().dirty
    }

    /// Write the sidecar if anything changed.
    pub fn flush(&self) -> Result<()> {
        self.shared.flush()
    }
}

impl Drop for PamMultiDim {
    fn drop(&mut self) {
        // failures were already reported by flush
        let _ = self.shared.flush();
    }
}

impl Shared {
    /// Sidecar location and whether it is a proxy.
    fn sidecar(&self) -> (PathBuf, bool) {
        match self.proxies.get(&self.filename) {
            Some(proxy) => (proxy, true),
            None => {
                let mut name = self.filename.clone().into_os_string();
                name.push(SIDECAR_SUFFIX);
                (PathBuf::from(name), false)
            }
        }
    }

    /// Locked state, loaded from disk on first access.
    fn state(&self) -> MutexGuard<'_, State> {
        let mut state = self.state.lock();
        if !state.loaded {
            state.loaded = true;
            if self.enabled {
                self.load(&mut state);
            }
        }
        state
    }

    #[tracing::instrument(skip_all, fields(file = %self.filename.display()))]
    fn load(&self, state: &mut State) {
        let (path, _) = self.sidecar();
        let result = xml::read_file(&path).and_then(|root| state.load_xml(&root));
        match result {
            Ok(()) => tracing::debug!("Loaded array metadata from {}", path.display()),
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::warn!("Ignoring unreadable sidecar {}: {e}", path.display()),
        }
    }

    #[tracing::instrument(skip_all, fields(file = %self.filename.display()))]
    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !self.enabled || !state.dirty {
            return Ok(());
        }

        let (path, via_proxy) = self.sidecar();
        let result = match state.to_xml() {
            Some(tree) => write_with_proxy(&tree, &path, &self.filename, via_proxy, &self.proxies).map(|_| ()),
            None => remove_stale(&path).map(|_| ()),
        };
        match result {
            Ok(()) => {
                state.dirty = false;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Unable to save array metadata of {}: {e}", self.filename.display());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path, name: &str) -> Arc<PamMultiDim> {
        let proxies = Arc::new(ProxyRegistry::ephemeral(dir.join("proxy")));
        PamMultiDim::get_pam_with(dir.join(name), &PamConfig::default(), proxies)
    }

    fn stats(approximate: bool) -> ArrayStatistics {
        ArrayStatistics {
            approximate,
            min: -1.5,
            max: 40.25,
            mean: 12.0,
            std_dev: 3.5,
            valid_count: 1000,
        }
    }

    #[test]
    fn test_shared_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let a = store_in(dir.path(), "f.nc");
        let b = store_in(dir.path(), "f.nc");
        assert!(Arc::ptr_eq(&a, &b));
        let other = store_in(dir.path(), "g.nc");
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn test_statistics_approx_gate() {
        let dir = tempfile::tempdir().unwrap();
        let pam = store_in(dir.path(), "f.nc");
        pam.set_statistics("/temp", "", stats(true));
        assert!(pam.statistics("/temp", "", false).is_none());
        assert_eq!(pam.statistics("/temp", "", true), Some(stats(true)));
        assert!(pam.statistics("/temp", "other", true).is_none());
        assert!(pam.is_dirty());
    }

    #[test]
    fn test_persist_on_release() {
        let dir = tempfile::tempdir().unwrap();
        {
            let pam = store_in(dir.path(), "f.nc");
            pam.set_statistics("/grp/temp", "ctx", stats(false));
            pam.set_spatial_ref("/grp/temp", "ctx", Some(Arc::new(SpatialRef::from_wkt("LOCAL_CS[\"a\"]"))));
        }
        assert!(dir.path().join("f.nc.aux.xml").exists());

        let pam = store_in(dir.path(), "f.nc");
        assert_eq!(pam.statistics("/grp/temp", "ctx", false), Some(stats(false)));
        assert_eq!(pam.spatial_ref("/grp/temp", "ctx").unwrap().wkt(), "LOCAL_CS[\"a\"]");
        assert!(!pam.is_dirty());
    }

    #[test]
    fn test_clear_statistics_removes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let pam = store_in(dir.path(), "c.nc");
        pam.set_statistics("/a", "", stats(false));
        pam.set_statistics("/b", "", stats(false));
        pam.flush().unwrap();
        let sidecar = dir.path().join("c.nc.aux.xml");
        assert!(sidecar.exists());

        pam.clear_array_statistics("/a", "");
        assert!(pam.statistics("/a", "", true).is_none());
        assert!(pam.statistics("/b", "", true).is_some());

        pam.clear_statistics();
        pam.flush().unwrap();
        assert!(!sidecar.exists());
    }

    #[test]
    fn test_disabled_keeps_memory_only() {
        let dir = tempfile::tempdir().unwrap();
        let proxies = Arc::new(ProxyRegistry::ephemeral(dir.path().join("proxy")));
        let pam = PamMultiDim::get_pam_with(dir.path().join("d.nc"), &PamConfig::disabled(), proxies);
        pam.set_statistics("/x", "", stats(false));
        pam.flush().unwrap();
        assert!(pam.statistics("/x", "", false).is_some());
        assert!(!dir.path().join("d.nc.aux.xml").exists());
    }

    #[test]
    fn test_unknown_nodes_survive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("u.nc.aux.xml"),
            "<PAMDataset><Vendor>x</Vendor><Array name=\"/v\"><Statistics><ApproxStats>0</ApproxStats><Minimum>1</Minimum><Maximum>2</Maximum><Mean>1.5</Mean><StdDev>0.5</StdDev><ValidSampleCount>4</ValidSampleCount></Statistics></Array></PAMDataset>",
        )
        .unwrap();
        {
            let pam = store_in(dir.path(), "u.nc");
            assert_eq!(pam.statistics("/v", "", false).unwrap().valid_count, 4);
            pam.clear_array_statistics("/v", "");
        }
        let root = xml::read_file(&dir.path().join("u.nc.aux.xml")).unwrap();
        assert_eq!(root.child_text("Vendor"), Some("x"));
        assert!(root.child("Array").is_none());
    }
}
