//! EPUB container reading: OCF container, OPF package and navigation.

mod parser;
mod reader;

pub use parser::{DublinCore, NavNode, NavShape, SpineRef};
pub use reader::{Container, ManifestItem, MediaKind};
