//! Proxy registry and redirection of sidecars that cannot be written in place.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use raster_pam::core::PROXY_INDEX_FILE;
use raster_pam::prelude::*;

#[test]
fn test_allocate_is_idempotent() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let registry = ProxyRegistry::ephemeral(dir.path());
    let canonical = Path::new("/readonly/data.tif");

    let first = registry.allocate(canonical).unwrap();
    let second = registry.allocate(canonical).unwrap();
    assert_eq!(first, second);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get(canonical), Some(first));
}

#[test]
fn test_deallocate_then_allocate() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let registry = ProxyRegistry::ephemeral(dir.path());
    let canonical = Path::new("/readonly/data.tif");

    registry.allocate(canonical).unwrap();
    assert!(registry.deallocate(canonical).is_some());
    assert!(registry.get(canonical).is_none());
    assert!(registry.deallocate(canonical).is_none());

    registry.allocate(canonical).unwrap();
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_concurrent_allocation_single_entry() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let registry = Arc::new(ProxyRegistry::ephemeral(dir.path()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.allocate(Path::new("/shared/scene.tif")).unwrap())
        })
        .collect();
    let paths: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(paths.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_persistent_index_survives_reopen() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let proxy = {
        let registry = ProxyRegistry::new(dir.path()).unwrap();
        registry.allocate(Path::new("/ro/a.tif")).unwrap()
    };
    assert!(dir.path().join(PROXY_INDEX_FILE).exists());

    let registry = ProxyRegistry::new(dir.path()).unwrap();
    assert!(registry.is_persistent());
    assert_eq!(registry.get(Path::new("/ro/a.tif")), Some(proxy));
}

#[test]
fn test_unwritable_location_falls_back_to_proxy() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let proxies = Arc::new(ProxyRegistry::ephemeral(dir.path().join("proxies")));
    // the data directory does not exist, so the natural sidecar cannot be created
    let data = dir.path().join("missing").join("scene.tif");
    let description = data.to_string_lossy().into_owned();

    {
        let mut ds = PamDataset::with_config(description.as_str(), 1, &PamConfig::default(), Arc::clone(&proxies));
        ds.set_metadata_item("NOTE", Some("proxied"), "");
        ds.flush().expect("Save through proxy failed");
        assert!(!ds.is_dirty());
        let written = ds.sidecar_path().unwrap().to_path_buf();
        assert!(written.starts_with(dir.path().join("proxies")));
        assert!(written.exists());
    }
    assert!(proxies.get(&data).is_some());

    let mut ds = PamDataset::with_config(description.as_str(), 1, &PamConfig::default(), Arc::clone(&proxies));
    ds.try_load(None).expect("Load through proxy failed");
    assert_eq!(ds.metadata_item("NOTE", ""), Some("proxied"));
}

#[test]
fn test_clean_drops_selected_entries() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let registry = ProxyRegistry::ephemeral(dir.path());
    for name in ["/a.tif", "/b.tif", "/c.tif"] {
        registry.allocate(Path::new(name)).unwrap();
    }
    let removed = registry.clean(|canonical, _| canonical != Path::new("/b.tif"));
    assert_eq!(removed, 1);
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.clear(), 2);
    assert!(registry.is_empty());
}
