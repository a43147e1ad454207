//! Process-wide registry of proxy sidecar locations.
//!
//! When the natural sidecar location of a resource cannot be written (a
//! read-only directory, a network path), its metadata is saved to a proxy
//! file under a dedicated directory instead. The registry maps the
//! canonical resource path to that proxy file.
//!
//! A registry built over a configured proxy directory is persistent: its
//! index is stored as `pam_proxy.json` in that directory, loaded on
//! construction and rewritten after every mutation. Without a configured
//! directory proxies live under the system temp dir for the life of the
//! process.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::util::{Error, PamConfig, Result};

/// File name of the persisted index inside the proxy directory.
pub const PROXY_INDEX_FILE: &str = "pam_proxy.json";

/// Number of trailing path characters kept in a proxy file name.
const PROXY_NAME_TAIL: usize = 220;

/// Serialized registry state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ProxyIndex {
    counter: u64,
    entries: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Default)]
struct State {
    index: ProxyIndex,
    /// Bumped on every mutation; orders concurrent index writes.
    generation: u64,
}

/// Canonical path -> proxy sidecar path.
#[derive(Debug)]
pub struct ProxyRegistry {
    dir: PathBuf,
    persistent: bool,
    state: Mutex<State>,
    /// Generation of the index last written to disk.
    persisted: Mutex<u64>,
}

static GLOBAL_REGISTRY: LazyLock<Arc<ProxyRegistry>> =
    LazyLock::new(|| Arc::new(ProxyRegistry::from_config(PamConfig::global())));

impl ProxyRegistry {
    /// Open a persistent registry in `dir`, creating the directory and
    /// loading an existing index.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let index_path = dir.join(PROXY_INDEX_FILE);
        let index = match fs::read_to_string(&index_path) {
            Ok(text) => serde_json::from_str::<ProxyIndex>(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ProxyIndex::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(
            "Opened proxy registry {} ({} entries)",
            dir.display(),
            index.entries.len()
        );

        Ok(Self {
            dir,
            persistent: true,
            state: Mutex::new(State { index, generation: 0 }),
            persisted: Mutex::new(0),
        })
    }

    /// Registry placing proxies in `dir` without persisting its index.
    pub fn ephemeral(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            persistent: false,
            state: Mutex::new(State::default()),
            persisted: Mutex::new(0),
        }
    }

    /// Build the registry described by a configuration.
    ///
    /// An unusable proxy directory degrades to an ephemeral registry.
    pub fn from_config(config: &PamConfig) -> Self {
        match &config.proxy_dir {
            Some(dir) => Self::new(dir).unwrap_or_else(|e| {
                tracing::warn!(
                    "Cannot use {} as proxy directory: {e}; proxies will not persist",
                    dir.display()
                );
                Self::ephemeral(dir)
            }),
            None => Self::ephemeral(std::env::temp_dir().join("pam_proxy")),
        }
    }

    /// Process-wide registry.
    pub fn global() -> Arc<ProxyRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Directory receiving proxy files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True when the index is stored on disk.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Proxy path for `canonical`, allocating one if none is registered.
    pub fn allocate(&self, canonical: &Path) -> Result<PathBuf> {
        let key = canonical_key(canonical);
        if let Some(existing) = self.state.lock().index.entries.get(&key) {
            return Ok(existing.clone());
        }

        fs::create_dir_all(&self.dir)?;

        let (proxy, snapshot) = {
            let mut state = self.state.lock();
            // another thread may have allocated while the lock was released
            if let Some(existing) = state.index.entries.get(&key) {
                return Ok(existing.clone());
            }
            state.index.counter += 1;
            let name = format!("{:06}_{}.aux.xml", state.index.counter, sanitized_tail(&key));
            let proxy = self.dir.join(name);
            state.index.entries.insert(key, proxy.clone());
            state.generation += 1;
            (proxy, self.snapshot(&state))
        };

        tracing::info!(
            "Allocated proxy {} for {}",
            proxy.display(),
            canonical.display()
        );
        self.persist(snapshot)?;
        Ok(proxy)
    }

    /// Remove the mapping for `canonical`, returning the old proxy path.
    ///
    /// The proxy file itself is left in place.
    pub fn deallocate(&self, canonical: &Path) -> Option<PathBuf> {
        let (removed, snapshot) = {
            let mut state = self.state.lock();
            let removed = state.index.entries.remove(&canonical_key(canonical))?;
            state.generation += 1;
            (removed, self.snapshot(&state))
        };
        self.persist_or_warn(snapshot);
        Some(removed)
    }

    /// Registered proxy for `canonical`.
    pub fn get(&self, canonical: &Path) -> Option<PathBuf> {
        self.state
            .lock()
            .index
            .entries
            .get(&canonical_key(canonical))
            .cloned()
    }

    /// Drop every mapping for which `retain(canonical, proxy)` is false.
    /// Returns the number of removed mappings.
    pub fn clean(&self, mut retain: impl FnMut(&Path, &Path) -> bool) -> usize {
        let (removed, snapshot) = {
            let mut state = self.state.lock();
            let before = state.index.entries.len();
            state
                .index
                .entries
                .retain(|canonical, proxy| retain(Path::new(canonical), proxy));
            let removed = before - state.index.entries.len();
            if removed == 0 {
                return 0;
            }
            state.generation += 1;
            (removed, self.snapshot(&state))
        };
        self.persist_or_warn(snapshot);
        removed
    }

    /// Drop every mapping.
    pub fn clear(&self) -> usize {
        self.clean(|_, _| false)
    }

    /// Number of mappings.
    pub fn len(&self) -> usize {
        self.state.lock().index.entries.len()
    }

    /// Check if there are no mappings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self, state: &State) -> Option<(ProxyIndex, u64)> {
        self.persistent
            .then(|| (state.index.clone(), state.generation))
    }

    fn persist(&self, snapshot: Option<(ProxyIndex, u64)>) -> Result<()> {
        let Some((index, generation)) = snapshot else {
            return Ok(());
        };
        let mut written = self.persisted.lock();
        if *written >= generation {
            // a newer state already reached the disk
            return Ok(());
        }
        let path = self.dir.join(PROXY_INDEX_FILE);
        let json = serde_json::to_string_pretty(&index)?;
        fs::write(&path, json).map_err(|e| Error::WriteFailed {
            path,
            reason: e.to_string(),
        })?;
        *written = generation;
        Ok(())
    }

    fn persist_or_warn(&self, snapshot: Option<(ProxyIndex, u64)>) {
        if let Err(e) = self.persist(snapshot) {
            tracing::warn!("Failed to update proxy index: {e}");
        }
    }
}

fn canonical_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Last characters of a path with separators and drive colons flattened.
fn sanitized_tail(path: &str) -> String {
    let count = path.chars().count();
    path.chars()
        .skip(count.saturating_sub(PROXY_NAME_TAIL))
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}
