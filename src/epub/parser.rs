//! EPUB parsing utilities (container.xml, OPF, NCX, EPUB 3 navigation document).

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::ContainerError;
use crate::util::strip_bom;

/// Navigation nesting beyond this depth is not descended into while parsing.
pub const MAX_NESTING: usize = 1024;

/// Dublin Core elements in source order, keyed by local name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DublinCore {
    entries: Vec<(String, String)>,
}

impl DublinCore {
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value recorded for `name`.
    pub fn first<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.all(name).next()
    }

    /// Every value recorded for `name`, in source order.
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A `<manifest><item>` as declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpfItem {
    pub id: String,
    /// href exactly as written in the package document.
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

/// A `<spine><itemref>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineRef {
    pub idref: String,
    pub linear: bool,
}

/// Parsed OPF package data.
#[derive(Debug, Clone, Default)]
pub struct OpfData {
    pub metadata: DublinCore,
    /// Manifest items in declaration order.
    pub manifest: Vec<OpfItem>,
    pub spine: Vec<SpineRef>,
    /// `spine@toc`: manifest id of the NCX.
    pub toc_id: Option<String>,
    /// EPUB 2 `<meta name="cover" content="..."/>`.
    pub cover_meta_id: Option<String>,
}

/// A raw navigation node, before it becomes a
/// [`NavigationEntry`](crate::book::NavigationEntry).
///
/// `href` is `None` for headings that only group children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavNode {
    pub title: String,
    pub href: Option<String>,
    pub children: Vec<NavNode>,
}

/// The two shapes a navigation node takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavShape<'a> {
    /// A link with nothing below it.
    Leaf { title: &'a str, href: &'a str },
    /// A grouping node, linked or not.
    Branch {
        title: &'a str,
        href: Option<&'a str>,
        children: &'a [NavNode],
    },
}

impl NavNode {
    pub fn shape(&self) -> NavShape<'_> {
        match (self.href.as_deref(), self.children.is_empty()) {
            (Some(href), true) => NavShape::Leaf {
                title: &self.title,
                href,
            },
            (href, _) => NavShape::Branch {
                title: &self.title,
                href,
                children: &self.children,
            },
        }
    }
}

/// Parse META-INF/container.xml to find the OPF path.
pub fn parse_container_xml(bytes: &[u8]) -> Result<String, ContainerError> {
    let content = String::from_utf8(strip_bom(bytes).to_vec())?;

    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if local_name(e.name().as_ref()) == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path")? {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(ContainerError::MissingElement(
        "rootfile in META-INF/container.xml".into(),
    ))
}

/// Parse OPF package document.
pub fn parse_opf(content: &str) -> Result<OpfData, ContainerError> {
    let mut reader = Reader::from_str(content);
    // <item/> and <item></item> are handled alike
    reader.config_mut().expand_empty_elements = true;

    let mut opf = OpfData::default();
    let mut in_metadata = false;
    let mut current_element: Option<String> = None;
    let mut buf_text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                match local {
                    b"metadata" => in_metadata = true,
                    b"title" | b"creator" | b"language" | b"identifier" | b"publisher"
                    | b"description" | b"subject" | b"date" | b"rights" | b"contributor"
                        if in_metadata =>
                    {
                        current_element = Some(String::from_utf8_lossy(local).into_owned());
                        buf_text.clear();
                    }
                    b"meta" if in_metadata => {
                        if attribute(&e, b"name")?.as_deref() == Some("cover")
                            && let Some(id) = attribute(&e, b"content")?
                            && !id.is_empty()
                            && opf.cover_meta_id.is_none()
                        {
                            opf.cover_meta_id = Some(id);
                        }
                    }
                    b"item" => {
                        let id = attribute(&e, b"id")?.unwrap_or_default();
                        if !id.is_empty() {
                            opf.manifest.push(OpfItem {
                                id,
                                href: attribute(&e, b"href")?.unwrap_or_default(),
                                media_type: attribute(&e, b"media-type")?.unwrap_or_default(),
                                properties: attribute(&e, b"properties")?,
                            });
                        }
                    }
                    b"spine" => opf.toc_id = attribute(&e, b"toc")?,
                    b"itemref" => {
                        if let Some(idref) = attribute(&e, b"idref")? {
                            let linear = attribute(&e, b"linear")?
                                .is_none_or(|v| !v.trim().eq_ignore_ascii_case("no"));
                            opf.spine.push(SpineRef { idref, linear });
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if current_element.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::CData(e) => {
                if current_element.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if current_element.is_some()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    buf_text.push_str(&resolved);
                }
            }
            Event::End(e) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                if local == b"metadata" {
                    in_metadata = false;
                }

                if let Some(elem) = current_element.as_deref()
                    && local == elem.as_bytes()
                {
                    opf.metadata.push(elem, buf_text.trim());
                    current_element = None;
                    buf_text.clear();
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(opf)
}

/// Parse NCX table of contents.
pub fn parse_ncx(content: &str) -> Result<Vec<NavNode>, ContainerError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().expand_empty_elements = true;

    let mut stack: Vec<NavNode> = vec![NavNode::default()];
    let mut skipped = 0usize;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"navPoint" if skipped > 0 || stack.len() > MAX_NESTING => skipped += 1,
                b"navPoint" => stack.push(NavNode::default()),
                b"text" if skipped == 0 => in_text = true,
                b"content" if skipped == 0 => {
                    if let Some(state) = stack.last_mut()
                        && state.href.is_none()
                    {
                        state.href = attribute(&e, b"src")?;
                    }
                }
                _ => {}
            },
            Event::Text(e) => {
                if in_text && let Some(state) = stack.last_mut() {
                    state.title.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if in_text
                    && let Some(state) = stack.last_mut()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    state.title.push_str(&resolved);
                }
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"text" => in_text = false,
                b"navPoint" if skipped > 0 => skipped -= 1,
                b"navPoint" => {
                    if stack.len() > 1
                        && let Some(mut node) = stack.pop()
                    {
                        node.title = collapse_whitespace(&node.title);
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(node);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    // Unclosed navPoints still belong to the tree
    while stack.len() > 1 {
        if let Some(mut node) = stack.pop() {
            node.title = collapse_whitespace(&node.title);
            if let Some(parent) = stack.last_mut() {
                parent.children.push(node);
            }
        }
    }

    Ok(stack.pop().map(|root| root.children).unwrap_or_default())
}

/// Parse an EPUB 3 navigation document.
///
/// Returns the `nav[epub:type~=toc]` tree, or the first `nav` when none is
/// typed. `li` elements without an `a` become heading nodes titled by their
/// `span`.
pub fn parse_nav_document(content: &str) -> Result<Vec<NavNode>, ContainerError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().expand_empty_elements = true;
    reader.config_mut().check_end_names = false;

    let mut navs: Vec<(bool, Vec<NavNode>)> = Vec::new();
    let mut current: Option<(bool, Vec<NavNode>)> = None;
    let mut skipped = 0usize;
    // Element whose text is the title of the innermost li
    let mut capture: Option<Vec<u8>> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                if local == b"nav" && current.is_none() {
                    let is_toc = attribute(&e, b"epub:type")?
                        .or(attribute(&e, b"type")?)
                        .is_some_and(|t| t.split_ascii_whitespace().any(|t| t == "toc"));
                    current = Some((is_toc, vec![NavNode::default()]));
                    continue;
                }

                let Some((_, stack)) = current.as_mut() else {
                    continue;
                };

                match local {
                    b"li" if skipped > 0 || stack.len() > MAX_NESTING => skipped += 1,
                    b"li" => stack.push(NavNode::default()),
                    b"a" if skipped == 0 && stack.len() > 1 => {
                        if let Some(state) = stack.last_mut() {
                            state.href = attribute(&e, b"href")?;
                            state.title.clear();
                        }
                        capture = Some(local.to_vec());
                    }
                    b"span" if skipped == 0 && capture.is_none() && stack.len() > 1 => {
                        if stack.last().is_some_and(|s| s.href.is_none() && s.title.is_empty()) {
                            capture = Some(local.to_vec());
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if capture.is_some()
                    && let Some((_, stack)) = current.as_mut()
                    && let Some(state) = stack.last_mut()
                {
                    state.title.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if capture.is_some()
                    && let Some((_, stack)) = current.as_mut()
                    && let Some(state) = stack.last_mut()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    state.title.push_str(&resolved);
                }
            }
            Event::End(e) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                if capture.as_deref() == Some(local) {
                    capture = None;
                    continue;
                }

                match local {
                    b"nav" => {
                        if let Some((is_toc, mut stack)) = current.take() {
                            fold_stack(&mut stack);
                            let roots = stack.pop().map(|r| r.children).unwrap_or_default();
                            navs.push((is_toc, roots));
                        }
                        skipped = 0;
                        capture = None;
                    }
                    b"li" if skipped > 0 => skipped -= 1,
                    b"li" => {
                        if let Some((_, stack)) = current.as_mut()
                            && stack.len() > 1
                            && let Some(mut node) = stack.pop()
                        {
                            node.title = collapse_whitespace(&node.title);
                            if let Some(parent) = stack.last_mut() {
                                parent.children.push(node);
                            }
                        }
                        capture = None;
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    // A nav left open at EOF is still usable
    if let Some((is_toc, mut stack)) = current.take() {
        fold_stack(&mut stack);
        navs.push((is_toc, stack.pop().map(|r| r.children).unwrap_or_default()));
    }

    let chosen = match navs.iter().position(|(is_toc, _)| *is_toc) {
        Some(i) => navs.swap_remove(i).1,
        None if !navs.is_empty() => navs.swap_remove(0).1,
        None => Vec::new(),
    };
    Ok(chosen)
}

/// Attach every open node on `stack` to its parent, leaving only the root.
fn fold_stack(stack: &mut Vec<NavNode>) {
    while stack.len() > 1 {
        if let Some(mut node) = stack.pop() {
            node.title = collapse_whitespace(&node.title);
            if let Some(parent) = stack.last_mut() {
                parent.children.push(node);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Read an attribute by qualified name, unescaping XML entities.
fn attribute(e: &BytesStart, name: &[u8]) -> Result<Option<String>, ContainerError> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            let raw = String::from_utf8(attr.value.to_vec())?;
            let value = match quick_xml::escape::unescape(&raw) {
                Ok(unescaped) => unescaped.into_owned(),
                Err(_) => raw,
            };
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve XML entity references, plus the HTML ones common in navigation labels.
fn resolve_entity(entity: &str) -> Option<String> {
    let named = match entity {
        "apos" => Some('\''),
        "quot" => Some('"'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "nbsp" => Some('\u{a0}'),
        "ndash" => Some('\u{2013}'),
        "mdash" => Some('\u{2014}'),
        "lsquo" => Some('\u{2018}'),
        "rsquo" => Some('\u{2019}'),
        "ldquo" => Some('\u{201c}'),
        "rdquo" => Some('\u{201d}'),
        "hellip" => Some('\u{2026}'),
        _ => None,
    };
    if let Some(c) = named {
        return Some(c.to_string());
    }

    let code = if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse::<u32>().ok()?
    };
    char::from_u32(code).map(|c| c.to_string())
}
