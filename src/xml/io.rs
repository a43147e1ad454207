//! Parsing and serialization of [`XmlNode`] trees through `quick-xml`.

use std::fs;
use std::io::Write;
use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::XmlNode;
use crate::util::{Error, Result};

/// Element under construction plus its raw text segments.
struct Frame {
    node: XmlNode,
    segments: Vec<String>,
}

impl Frame {
    fn new(node: XmlNode) -> Self {
        Self { node, segments: Vec::new() }
    }

    /// Finish the element: leaf elements keep their text verbatim, elements
    /// with children drop whitespace-only segments (indentation).
    fn finish(mut self) -> XmlNode {
        let text: String = if self.node.children.is_empty() {
            self.segments.concat()
        } else {
            self.segments
                .iter()
                .filter(|s| !s.trim().is_empty())
                .map(String::as_str)
                .collect()
        };
        if !text.is_empty() {
            self.node.text = Some(text);
        }
        self.node
    }
}

/// Parse a document from a string. The document must have exactly one root.
pub fn parse_str(content: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(content);
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                stack.push(Frame::new(element_from(e)?));
            }
            Ok(Event::Empty(ref e)) => {
                let node = element_from(e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::End(_)) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| Error::parse("closing tag without opening tag"))?;
                attach(&mut stack, &mut root, frame.finish())?;
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| Error::parse(format!("bad character data: {err}")))?;
                match stack.last_mut() {
                    Some(frame) => frame.segments.push(text.into_owned()),
                    None if text.trim().is_empty() => {}
                    None => return Err(Error::parse("text outside of root element")),
                }
            }
            Ok(Event::CData(e)) => {
                let data = String::from_utf8_lossy(&e.into_inner()).into_owned();
                if let Some(frame) = stack.last_mut() {
                    frame.segments.push(data);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::parse(format!(
                    "XML error at position {}: {e}",
                    reader.buffer_position()
                )))
            }
            // declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::parse(format!("unclosed element <{}>", open.node.name)));
    }
    root.ok_or_else(|| Error::parse("document has no root element"))
}

fn element_from(e: &BytesStart<'_>) -> Result<XmlNode> {
    let mut node = XmlNode::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::parse(format!("bad attribute: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| Error::parse(format!("bad attribute value: {err}")))?
            .into_owned();
        node.attributes.push((key, value));
    }
    Ok(node)
}

fn attach(stack: &mut [Frame], root: &mut Option<XmlNode>, node: XmlNode) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.node.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(Error::parse(format!(
            "second root element <{}>",
            node.name
        ))),
    }
}

/// Serialize a tree to an indented string.
pub fn to_string(node: &XmlNode) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_node(&mut writer, node)?;
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).map_err(|e| Error::other(format!("XML output is not UTF-8: {e}")))
}

/// Serialize a tree on one line, without indentation or trailing newline.
pub fn to_compact_string(node: &XmlNode) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    write_node(&mut writer, node)?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| Error::other(format!("XML output is not UTF-8: {e}")))
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<()> {
    let mut start = BytesStart::new(node.name.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if node.text.is_none() && node.children.is_empty() {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    if let Some(text) = &node.text {
        emit(writer, Event::Text(BytesText::new(text)))?;
    }
    for child in &node.children {
        write_node(writer, child)?;
    }
    emit(writer, Event::End(BytesEnd::new(node.name.as_str())))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::other(format!("XML write error: {e}")))
}

/// Read and parse a document from disk.
///
/// A missing file maps to [`Error::NotFound`]; malformed content to
/// [`Error::Parse`] carrying the path.
pub fn read_file(path: &Path) -> Result<XmlNode> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })?;
    parse_str(&content).map_err(|e| e.with_path(path))
}

/// Serialize a document and write it to disk.
///
/// The content goes to a temporary file in the target directory which is
/// then renamed over `path`, so readers see either the old or the new
/// document.
pub fn write_file(node: &XmlNode, path: &Path) -> Result<()> {
    let content = to_string(node)?;
    let failed = |e: std::io::Error| Error::WriteFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut builder = tempfile::Builder::new();
    builder.prefix(".aux-").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }

    let mut file = builder.tempfile_in(dir).map_err(failed)?;
    file.write_all(content.as_bytes()).map_err(failed)?;
    file.persist(path).map_err(|e| failed(e.error))?;
    Ok(())
}
