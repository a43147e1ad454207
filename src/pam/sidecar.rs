//! Sidecar file naming, lookup and writing.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::core::ProxyRegistry;
use crate::util::Result;
use crate::xml::{self, XmlNode};

/// Suffix appended to the resource path to form its sidecar name.
pub const SIDECAR_SUFFIX: &str = ".aux.xml";

/// Check whether a sidecar can live next to `base`.
///
/// Empty names and URLs have no directory to write into.
pub fn can_accept_sidecar(base: &str) -> bool {
    !base.trim().is_empty() && !base.contains("://")
}

/// Natural sidecar name for `base`, qualified by a subdataset name if any.
///
/// ```
/// use raster_pam::pam::sidecar_name;
///
/// assert_eq!(sidecar_name("/d/a.nc", None), "/d/a.nc.aux.xml");
/// assert_eq!(sidecar_name("/d/a.nc", Some("temp:0")), "/d/a.nc.temp_0.aux.xml");
/// ```
pub fn sidecar_name(base: &str, subdataset: Option<&str>) -> String {
    match subdataset.filter(|s| !s.is_empty()) {
        Some(subds) => format!("{base}.{}{SIDECAR_SUFFIX}", sanitize_component(subds)),
        None => format!("{base}{SIDECAR_SUFFIX}"),
    }
}

/// Replace characters that cannot appear in a file name component.
fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// Prefer the casing of an existing sibling over the synthesized name.
///
/// `siblings` lists the file names present in the candidate's directory.
/// A case-insensitive match returns the candidate's directory joined with
/// the sibling's exact name; otherwise the candidate is returned as is.
pub fn resolve_sibling(candidate: &Path, siblings: &[String]) -> PathBuf {
    let Some(name) = candidate.file_name().and_then(|n| n.to_str()) else {
        return candidate.to_path_buf();
    };
    match siblings.iter().find(|s| s.eq_ignore_ascii_case(name)) {
        Some(existing) => candidate.with_file_name(existing),
        None => candidate.to_path_buf(),
    }
}

/// Check whether the candidate's file name appears in `siblings` (exact).
pub(crate) fn listed_in(candidate: &Path, siblings: &[String]) -> bool {
    candidate
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| siblings.iter().any(|s| s == name))
}

/// Write `tree` to `path`, falling back to a proxy location.
///
/// The fallback applies only when `path` is the natural location and no
/// proxy is registered yet for `canonical`. Returns the path written.
pub(crate) fn write_with_proxy(
    tree: &XmlNode,
    path: &Path,
    canonical: &Path,
    via_proxy: bool,
    proxies: &ProxyRegistry,
) -> Result<PathBuf> {
    match xml::write_file(tree, path) {
        Ok(()) => Ok(path.to_path_buf()),
        Err(e) if !via_proxy && proxies.get(canonical).is_none() => {
            let proxy = proxies.allocate(canonical)?;
            tracing::info!(
                "Cannot write {} ({e}); saving to proxy {}",
                path.display(),
                proxy.display()
            );
            xml::write_file(tree, &proxy)?;
            Ok(proxy)
        }
        Err(e) => Err(e),
    }
}

/// Delete a sidecar that no longer has content. Returns true if a file went.
pub(crate) fn remove_stale(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Removed empty sidecar {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(sidecar_name("/d/a.tif", None), "/d/a.tif.aux.xml");
        assert_eq!(sidecar_name("/d/a.tif", Some("")), "/d/a.tif.aux.xml");
        assert_eq!(sidecar_name("/d/a.h5", Some("/grp/var")), "/d/a.h5._grp_var.aux.xml");
        assert!(can_accept_sidecar("/d/a.tif"));
        assert!(!can_accept_sidecar(""));
        assert!(!can_accept_sidecar("https://host/a.tif"));
    }

    #[test]
    fn test_resolve_sibling_prefers_existing_casing() {
        let siblings = vec!["other.tif".to_string(), "Data.PAM.XML".to_string()];
        let resolved = resolve_sibling(Path::new("/d/data.pam.xml"), &siblings);
        assert_eq!(resolved, PathBuf::from("/d/Data.PAM.XML"));

        let untouched = resolve_sibling(Path::new("/d/new.aux.xml"), &siblings);
        assert_eq!(untouched, PathBuf::from("/d/new.aux.xml"));
    }

    #[test]
    fn test_listed_in() {
        let siblings = vec!["a.tif".to_string(), "a.tif.aux.xml".to_string()];
        assert!(listed_in(Path::new("/x/a.tif.aux.xml"), &siblings));
        assert!(!listed_in(Path::new("/x/b.tif.aux.xml"), &siblings));
    }

    #[test]
    fn test_write_falls_back_to_proxy() {
        let dir = tempfile::tempdir().unwrap();
        let proxies = ProxyRegistry::ephemeral(dir.path().join("proxy"));
        let canonical = dir.path().join("missing").join("a.tif");
        let natural = PathBuf::from(sidecar_name(canonical.to_str().unwrap(), None));
        let tree = XmlNode::with_text("PAMDataset", "x");

        let written = write_with_proxy(&tree, &natural, &canonical, false, &proxies).unwrap();
        assert_ne!(written, natural);
        assert_eq!(proxies.get(&canonical), Some(written.clone()));
        assert_eq!(xml::read_file(&written).unwrap(), tree);

        // already proxied: no second allocation, the error surfaces
        assert!(write_with_proxy(&tree, &natural, &canonical, false, &proxies).is_err());
        assert_eq!(proxies.len(), 1);
    }

    #[test]
    fn test_remove_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tif.aux.xml");
        assert!(!remove_stale(&path).unwrap());
        fs::write(&path, "<PAMDataset/>").unwrap();
        assert!(remove_stale(&path).unwrap());
        assert!(!path.exists());
    }
}
