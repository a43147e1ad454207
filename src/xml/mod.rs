//! Hierarchical document layer.
//!
//! A small generic element tree used as the in-memory form of sidecar
//! files. It knows nothing about PAM element names, so nodes it does not
//! understand survive a read/modify/write cycle untouched.

mod node;
mod io;

pub use node::XmlNode;
pub use io::{parse_str, to_compact_string, to_string, read_file, write_file};
