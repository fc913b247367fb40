use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use tracing::{debug, warn};
use zip::ZipArchive;

use super::parser::{
    DublinCore, NavNode, OpfItem, SpineRef, parse_container_xml, parse_nav_document, parse_ncx,
    parse_opf,
};
use crate::error::ContainerError;
use crate::util::{
    decode_document, is_external, parent_dir, percent_decode, relative_to, resolve_relative_path,
    strip_bom,
};

const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// Coarse classification of a manifest resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Document,
    Image,
    Other,
}

impl MediaKind {
    pub fn from_media_type(media_type: &str) -> Self {
        let media_type = media_type.trim().to_ascii_lowercase();
        match media_type.as_str() {
            "application/xhtml+xml" | "text/html" | "application/xhtml" => MediaKind::Document,
            t if t.starts_with("image/") => MediaKind::Image,
            _ => MediaKind::Other,
        }
    }
}

/// A manifest resource with its content loaded from the archive.
#[derive(Debug, Clone)]
pub struct ManifestItem {
    pub id: String,
    /// Percent-decoded href relative to the package document.
    pub href: String,
    /// href as written in the package document.
    pub raw_href: String,
    /// Full path inside the ZIP archive.
    pub path: String,
    pub media_type: String,
    pub kind: MediaKind,
    pub properties: Option<String>,
    data: Option<Vec<u8>>,
}

impl ManifestItem {
    /// Resource bytes, or `None` when the archive does not contain the file.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn is_document(&self) -> bool {
        self.kind == MediaKind::Document
    }

    pub fn is_image(&self) -> bool {
        self.kind == MediaKind::Image
    }

    /// Whether the space-separated `properties` attribute lists `property`.
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|props| props.split_ascii_whitespace().any(|p| p == property))
    }

    /// Directory of `href`, used to resolve references made by this document.
    pub fn href_dir(&self) -> &str {
        parent_dir(&self.href)
    }
}

/// An opened EPUB container.
///
/// Everything is read eagerly; the archive is not touched again after
/// [`Container::from_reader`] returns.
#[derive(Debug)]
pub struct Container {
    opf_path: String,
    metadata: DublinCore,
    manifest: Vec<ManifestItem>,
    by_id: HashMap<String, usize>,
    spine: Vec<SpineRef>,
    navigation: Vec<NavNode>,
    navigation_error: Option<String>,
    cover_id: Option<String>,
}

impl Container {
    /// Open an EPUB file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ContainerError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Read an EPUB from any [`Read`] + [`Seek`] source.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, ContainerError> {
        let mut archive = ZipArchive::new(reader)?;

        // 1. Find the OPF file path from container.xml
        let container_xml = read_archive_file_bytes(&mut archive, "META-INF/container.xml")?;
        let opf_path = parse_container_xml(&container_xml)?;
        let opf_dir = parent_dir(&opf_path).to_string();

        // 2. Parse the OPF file
        let opf_bytes = read_archive_file_bytes(&mut archive, &opf_path)?;
        let opf_content = String::from_utf8(strip_bom(&opf_bytes).to_vec())?;
        let opf = parse_opf(&opf_content)?;

        // 3. Load all resources from manifest, in declaration order
        let mut manifest = Vec::with_capacity(opf.manifest.len());
        let mut by_id = HashMap::new();
        for OpfItem {
            id,
            href: raw_href,
            media_type,
            properties,
        } in opf.manifest
        {
            if by_id.contains_key(&id) {
                warn!(%id, "duplicate manifest id; keeping the first declaration");
                continue;
            }

            let href = percent_decode(&raw_href);
            let path = resolve_relative_path(&opf_dir, &href);
            let data = match read_archive_file_bytes(&mut archive, &path) {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!(%path, error = %e, "manifest item missing from archive");
                    None
                }
            };

            by_id.insert(id.clone(), manifest.len());
            manifest.push(ManifestItem {
                id,
                kind: MediaKind::from_media_type(&media_type),
                href,
                raw_href,
                path,
                media_type,
                properties,
                data,
            });
        }

        let mut container = Self {
            opf_path,
            metadata: opf.metadata,
            manifest,
            by_id,
            spine: opf.spine,
            navigation: Vec::new(),
            navigation_error: None,
            cover_id: None,
        };

        container.cover_id = container.find_declared_cover(opf.cover_meta_id.as_deref());
        container.load_navigation(opf.toc_id.as_deref());

        debug!(
            opf = %container.opf_path,
            manifest = container.manifest.len(),
            spine = container.spine.len(),
            navigation = container.navigation.len(),
            "opened container"
        );

        Ok(container)
    }

    /// Path of the package document inside the archive.
    pub fn opf_path(&self) -> &str {
        &self.opf_path
    }

    pub fn dublin_core(&self) -> &DublinCore {
        &self.metadata
    }

    /// Manifest items in declaration order.
    pub fn manifest(&self) -> &[ManifestItem] {
        &self.manifest
    }

    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.by_id.get(id).map(|&i| &self.manifest[i])
    }

    pub fn documents(&self) -> impl Iterator<Item = &ManifestItem> {
        self.manifest.iter().filter(|item| item.is_document())
    }

    pub fn images(&self) -> impl Iterator<Item = &ManifestItem> {
        self.manifest.iter().filter(|item| item.is_image())
    }

    /// Spine in reading order.
    pub fn spine(&self) -> &[SpineRef] {
        &self.spine
    }

    /// Raw navigation tree; empty when the book has none.
    pub fn navigation(&self) -> &[NavNode] {
        &self.navigation
    }

    /// Why the navigation could not be read, when it could not.
    pub fn navigation_error(&self) -> Option<&str> {
        self.navigation_error.as_deref()
    }

    /// Manifest item explicitly declared as the cover, if any.
    pub fn declared_cover(&self) -> Option<&ManifestItem> {
        self.cover_id.as_deref().and_then(|id| self.item(id))
    }

    /// EPUB 3 `cover-image` property first, then the EPUB 2 `<meta name="cover">`.
    ///
    /// Some packages put an href in the meta instead of an id; both are accepted.
    fn find_declared_cover(&self, cover_meta: Option<&str>) -> Option<String> {
        if let Some(item) = self
            .manifest
            .iter()
            .find(|item| item.has_property("cover-image"))
        {
            return Some(item.id.clone());
        }

        let meta = cover_meta?;
        if self.by_id.contains_key(meta) {
            return Some(meta.to_string());
        }
        let decoded = percent_decode(meta);
        self.manifest
            .iter()
            .find(|item| item.href == decoded)
            .map(|item| item.id.clone())
    }

    fn load_navigation(&mut self, toc_id: Option<&str>) {
        let opf_dir = parent_dir(&self.opf_path).to_string();
        let mut errors = Vec::new();

        let ncx = toc_id
            .and_then(|id| self.item(id))
            .or_else(|| {
                self.manifest
                    .iter()
                    .find(|item| item.media_type.eq_ignore_ascii_case(NCX_MEDIA_TYPE))
            })
            .map(|item| (item.path.clone(), item.data.clone()));

        if let Some((path, data)) = ncx {
            match read_navigation(&path, data.as_deref(), parse_ncx) {
                Ok(nodes) if !nodes.is_empty() => {
                    self.navigation = rebase_nodes(nodes, parent_dir(&path), &opf_dir);
                    return;
                }
                Ok(_) => {}
                Err(reason) => errors.push(reason),
            }
        }

        let nav = self
            .manifest
            .iter()
            .find(|item| item.has_property("nav"))
            .map(|item| (item.path.clone(), item.data.clone()));

        if let Some((path, data)) = nav {
            match read_navigation(&path, data.as_deref(), parse_nav_document) {
                Ok(nodes) => {
                    self.navigation = rebase_nodes(nodes, parent_dir(&path), &opf_dir);
                    if !self.navigation.is_empty() {
                        return;
                    }
                }
                Err(reason) => errors.push(reason),
            }
        }

        if !errors.is_empty() {
            let reason = errors.join("; ");
            warn!(%reason, "navigation unreadable");
            self.navigation_error = Some(reason);
        }
    }
}

fn read_navigation(
    path: &str,
    data: Option<&[u8]>,
    parse: fn(&str) -> Result<Vec<NavNode>, ContainerError>,
) -> Result<Vec<NavNode>, String> {
    let data = data.ok_or_else(|| format!("{path}: missing from archive"))?;
    let content = decode_document(data);
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
    parse(content).map_err(|e| format!("{path}: {e}"))
}

/// Re-express navigation hrefs relative to the package document, the
/// convention manifest hrefs follow.
fn rebase_nodes(nodes: Vec<NavNode>, nav_dir: &str, opf_dir: &str) -> Vec<NavNode> {
    nodes
        .into_iter()
        .map(|node| NavNode {
            title: node.title,
            href: node.href.map(|href| rebase_href(&href, nav_dir, opf_dir)),
            children: rebase_nodes(node.children, nav_dir, opf_dir),
        })
        .collect()
}

fn rebase_href(href: &str, nav_dir: &str, opf_dir: &str) -> String {
    let href = href.trim();
    if is_external(href) {
        return href.to_string();
    }

    let (path, fragment) = match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    };

    let path = if path.is_empty() {
        String::new()
    } else {
        let full = resolve_relative_path(nav_dir, &percent_decode(path));
        relative_to(opf_dir, &full)
    };

    match fragment {
        Some(fragment) => format!("{path}#{fragment}"),
        None => path,
    }
}

fn read_archive_file_bytes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Vec<u8>, ContainerError> {
    // Try direct lookup first
    match archive.by_name(path) {
        Ok(mut file) => {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            return Ok(contents);
        }
        Err(zip::result::ZipError::FileNotFound) => {}
        Err(e) => return Err(e.into()),
    }

    // Fallback: try percent-decoded path (handles malformed EPUBs)
    let decoded = percent_decode(path);
    if decoded != path {
        match archive.by_name(&decoded) {
            Ok(mut file) => {
                let mut contents = Vec::new();
                file.read_to_end(&mut contents)?;
                return Ok(contents);
            }
            Err(zip::result::ZipError::FileNotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Err(ContainerError::InvalidEpub(format!(
        "{path} not found in archive"
    )))
}
