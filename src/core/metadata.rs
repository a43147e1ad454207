//! Key/value metadata, grouped into named domains.
//!
//! Every dataset and band carries a set of domains. The default domain has
//! the empty name; others ("IMAGERY", "RPC", ...) are created on first use.
//! Domains whose name starts with `xml:` hold a single XML document as
//! their only item, keyed by the domain name. Sidecars store it as an
//! embedded tree when that reproduces the text exactly.

use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

use crate::util::Result;
use crate::xml::{self, XmlNode};

/// Metadata storage - ordered key-value pairs of strings.
///
/// Uses SmallVec optimization for common case of few entries.
#[derive(Clone, Default, PartialEq)]
pub struct MetaData {
    entries: SmallVec<[(String, String); 4]>,
}

impl MetaData {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a metadata value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        // Update existing or add new
        for (k, v) in &mut self.entries {
            if k == &key {
                *v = value;
                return;
            }
        }
        self.entries.push((key, value));
    }

    /// Get a metadata value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Check if a key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Remove a key and return its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        if let Some(pos) = self.entries.iter().position(|(k, _)| k == key) {
            Some(self.entries.remove(pos).1)
        } else {
            None
        }
    }

    /// Remove every key starting with `prefix`, returning how many went.
    pub fn remove_prefixed(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.starts_with(prefix));
        before - self.entries.len()
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over key-value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

}

impl fmt::Debug for MetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl FromIterator<(String, String)> for MetaData {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut meta = Self::new();
        for (k, v) in iter {
            meta.set(k, v);
        }
        meta
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for MetaData {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        let mut meta = Self::new();
        for (k, v) in iter {
            meta.set(k, v);
        }
        meta
    }
}

/// Named metadata domains.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataDomains {
    domains: BTreeMap<String, MetaData>,
}

impl MetadataDomains {
    /// Create an empty set of domains.
    pub fn new() -> Self {
        Self::default()
    }

    /// Items of a domain, if it holds any.
    pub fn domain(&self, domain: &str) -> Option<&MetaData> {
        self.domains.get(domain).filter(|m| !m.is_empty())
    }

    /// Replace a whole domain. An empty `items` removes it.
    pub fn set_domain(&mut self, domain: &str, items: MetaData) {
        if items.is_empty() {
            self.domains.remove(domain);
        } else {
            self.domains.insert(domain.to_string(), items);
        }
    }

    /// Get one item.
    pub fn item(&self, key: &str, domain: &str) -> Option<&str> {
        self.domains.get(domain).and_then(|m| m.get(key))
    }

    /// Set one item; `None` removes it.
    pub fn set_item(&mut self, key: &str, value: Option<&str>, domain: &str) {
        match value {
            Some(value) => self
                .domains
                .entry(domain.to_string())
                .or_default()
                .set(key, value),
            None => {
                if let Some(items) = self.domains.get_mut(domain) {
                    items.remove(key);
                    if items.is_empty() {
                        self.domains.remove(domain);
                    }
                }
            }
        }
    }

    /// Names of non-empty domains.
    pub fn domain_names(&self) -> Vec<&str> {
        self.domains
            .iter()
            .filter(|(_, m)| !m.is_empty())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Mutable access to every domain.
    pub(crate) fn domains_mut(&mut self) -> impl Iterator<Item = (&String, &mut MetaData)> {
        self.domains.iter_mut()
    }

    /// Check if no domain holds items.
    pub fn is_empty(&self) -> bool {
        self.domains.values().all(MetaData::is_empty)
    }

    /// Serialize every domain as `<Metadata>` elements.
    ///
    /// An `xml:` domain is embedded as a tree when its only item is keyed
    /// by the domain name and the compact form of the parsed document is
    /// identical to the stored text. Anything else is written as plain items.
    pub(crate) fn to_xml(&self) -> Vec<XmlNode> {
        let mut nodes = Vec::new();
        for (name, items) in &self.domains {
            if items.is_empty() {
                continue;
            }
            let mut node = XmlNode::new("Metadata");
            if !name.is_empty() {
                node.set_attribute("domain", name.as_str());
            }

            let embedded = if name.starts_with("xml:") && items.len() == 1 {
                items
                    .iter()
                    .next()
                    .filter(|(key, _)| *key == name.as_str())
                    .and_then(|(_, doc)| embeddable(doc))
            } else {
                None
            };

            match embedded {
                Some(tree) => {
                    node.set_attribute("format", "xml");
                    node.push(tree);
                }
                None => {
                    for (k, v) in items.iter() {
                        node.push(XmlNode::with_text("MDI", v).attr("key", k));
                    }
                }
            }
            nodes.push(node);
        }
        nodes
    }

    /// Merge one `<Metadata>` element into the domains.
    pub(crate) fn load_xml(&mut self, node: &XmlNode) -> Result<()> {
        let domain = node.attribute("domain").unwrap_or("");
        let mut items = MetaData::new();

        if node.attribute("format") == Some("xml") {
            if let Some(tree) = node.children.first() {
                items.set(domain, xml::to_compact_string(tree)?);
            }
        } else {
            for mdi in node.children_named("MDI") {
                if let Some(key) = mdi.attribute("key") {
                    items.set(key, mdi.text());
                }
            }
        }

        self.set_domain(domain, items);
        Ok(())
    }
}

/// Parsed document, if writing it back compactly gives `doc` unchanged.
fn embeddable(doc: &str) -> Option<XmlNode> {
    let tree = xml::parse_str(doc).ok()?;
    match xml::to_compact_string(&tree) {
        Ok(text) if text == doc => Some(tree),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_keep_order() {
        let mut meta = MetaData::new();
        meta.set("STATISTICS_MINIMUM", "0");
        meta.set("AREA_OR_POINT", "Area");
        meta.set("STATISTICS_MINIMUM", "-3");

        assert_eq!(meta.get("STATISTICS_MINIMUM"), Some("-3"));
        assert_eq!(meta.get("TIFFTAG_DATETIME"), None);
        let keys: Vec<_> = meta.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["STATISTICS_MINIMUM", "AREA_OR_POINT"]);

        assert_eq!(meta.remove_prefixed("STATISTICS_"), 1);
        assert_eq!(meta.len(), 1);
    }

    #[test]
    fn test_remove_prefixed() {
        let mut meta: MetaData = [("STATISTICS_MEAN", "1"), ("STATISTICS_MAX", "2"), ("OTHER", "3")]
            .into_iter()
            .collect();
        assert_eq!(meta.remove_prefixed("STATISTICS_"), 2);
        assert_eq!(meta.len(), 1);
    }

    #[test]
    fn test_domains_items() {
        let mut domains = MetadataDomains::new();
        domains.set_item("A", Some("1"), "");
        domains.set_item("B", Some("2"), "IMAGERY");
        assert_eq!(domains.item("A", ""), Some("1"));
        assert_eq!(domains.domain_names(), vec!["", "IMAGERY"]);

        domains.set_item("B", None, "IMAGERY");
        assert!(domains.domain("IMAGERY").is_none());
        assert_eq!(domains.domain_names(), vec![""]);
    }

    #[test]
    fn test_domains_xml_roundtrip() {
        let mut domains = MetadataDomains::new();
        domains.set_item("k", Some("v & w"), "");
        domains.set_item("SUN_AZIMUTH", Some("120.5"), "IMAGERY");
        domains.set_item("xml:XMP", Some("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/>"), "xml:XMP");

        let nodes = domains.to_xml();
        assert_eq!(nodes.len(), 3);
        let xmp = nodes.iter().find(|n| n.attribute("domain") == Some("xml:XMP")).unwrap();
        assert_eq!(xmp.attribute("format"), Some("xml"));
        assert_eq!(xmp.children[0].name, "x:xmpmeta");

        let mut back = MetadataDomains::new();
        for node in &nodes {
            back.load_xml(node).unwrap();
        }
        assert_eq!(back.item("k", ""), Some("v & w"));
        assert_eq!(back.item("SUN_AZIMUTH", "IMAGERY"), Some("120.5"));
        assert_eq!(
            back.item("xml:XMP", "xml:XMP"),
            Some("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/>")
        );
    }

    #[test]
    fn test_xml_domain_text_kept_exactly() {
        let mut domains = MetadataDomains::new();
        domains.set_item("doc", Some("<a><b>1</b></a>"), "xml:test");
        domains.set_item("xml:pretty", Some("<a>\n  <b>1</b>\n</a>\n"), "xml:pretty");
        domains.set_item("xml:bare", Some("<a><b>1</b></a>"), "xml:bare");

        let nodes = domains.to_xml();
        let by_domain = |d: &str| nodes.iter().find(|n| n.attribute("domain") == Some(d)).unwrap();
        // foreign key or reformatted text: plain items
        assert_eq!(by_domain("xml:test").attribute("format"), None);
        assert_eq!(by_domain("xml:pretty").attribute("format"), None);
        assert_eq!(by_domain("xml:bare").attribute("format"), Some("xml"));

        let mut back = MetadataDomains::new();
        for node in &nodes {
            back.load_xml(node).unwrap();
        }
        assert_eq!(back, domains);
    }
}
