//! Generic element tree.

use std::fmt;

/// One element of a hierarchical document.
///
/// Attributes keep their document order. Text content is the concatenated
/// character data of the element; whitespace-only text around child
/// elements is dropped when parsing.
#[derive(Clone, Default, PartialEq)]
pub struct XmlNode {
    /// Element name (tag).
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Character data, if any.
    pub text: Option<String>,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Create an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create an element holding only text.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Builder-style attribute setter.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Get an attribute value.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set or replace an attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        for (k, v) in &mut self.attributes {
            if *k == key {
                *v = value;
                return;
            }
        }
        self.attributes.push((key, value));
    }

    /// Text content, or "" when absent.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first child with the given name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text())
    }

    /// Append a child element.
    pub fn push(&mut self, child: XmlNode) -> &mut XmlNode {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Append a text-only child element.
    pub fn push_text(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.children.push(Self::with_text(name, text));
    }

    /// Remove every child with the given name, returning how many were removed.
    pub fn remove_children(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|c| c.name != name);
        before - self.children.len()
    }

    /// True if the element has no attributes, text or children.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.text.is_none() && self.children.is_empty()
    }
}

impl fmt::Debug for XmlNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("XmlNode");
        d.field("name", &self.name);
        if !self.attributes.is_empty() {
            d.field("attributes", &self.attributes);
        }
        if let Some(text) = &self.text {
            d.field("text", text);
        }
        if !self.children.is_empty() {
            d.field("children", &self.children);
        }
        d.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes() {
        let mut node = XmlNode::new("Metadata").attr("domain", "IMAGERY");
        assert_eq!(node.attribute("domain"), Some("IMAGERY"));
        node.set_attribute("domain", "RPC");
        assert_eq!(node.attribute("domain"), Some("RPC"));
        assert_eq!(node.attributes.len(), 1);
        assert_eq!(node.attribute("missing"), None);
    }

    #[test]
    fn test_children() {
        let mut root = XmlNode::new("Root");
        root.push_text("A", "1");
        root.push_text("B", "2");
        root.push_text("A", "3");

        assert_eq!(root.child_text("A"), Some("1"));
        assert_eq!(root.children_named("A").count(), 2);
        assert_eq!(root.remove_children("A"), 2);
        assert_eq!(root.children.len(), 1);
        assert!(root.child("A").is_none());
        assert!(XmlNode::new("x").is_empty());
    }
}
