//! HTML parsing and manipulation using html5ever
//!
//! Provides utilities for:
//! - Parsing XHTML chapter documents and body fragments
//! - Removing unsafe or non-content elements
//! - Rewriting image references
//! - Serializing body content and extracting plain text

use std::default::Default;

use html5ever::parse_document;
use html5ever::serialize::{SerializeOpts, TraversalScope, serialize};
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{ParseOpts, namespace_url, ns};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};

/// Elements dropped from chapter content, matched by local name in any namespace.
pub const REMOVED_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "video", "nav", "form", "button", "input",
];

/// Parse HTML content into a DOM tree
pub fn parse_html(html: &str) -> RcDom {
    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            drop_doctype: true,
            ..Default::default()
        },
        ..Default::default()
    };

    parse_document(RcDom::default(), opts)
        .from_utf8()
        .one(html.as_bytes())
}

/// HTML void elements; a self-closing tag is only valid HTML for these.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta",
    "param", "source", "track", "wbr",
];

/// Parse an EPUB content document.
///
/// Content documents are usually XHTML, where `<title/>` or `<a id="x"/>` is an
/// empty element. The HTML tree builder ignores `/>` on non-void elements, so
/// those tags are expanded to start/end pairs first. Documents that are not
/// well-formed enough to tokenize as XML are parsed as they are.
pub fn parse_content_document(source: &str) -> RcDom {
    match expand_self_closing(source) {
        Some(expanded) => parse_html(&expanded),
        None => parse_html(source),
    }
}

/// Rewrite `<tag .../>` as `<tag ...></tag>` for every non-void element.
///
/// The XML declaration and processing instructions are dropped and CDATA
/// sections become escaped text; all other markup is copied through unchanged.
/// Returns `None` when the source cannot be tokenized.
pub fn expand_self_closing(source: &str) -> Option<String> {
    let mut reader = Reader::from_str(source);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut writer = Writer::new(Vec::with_capacity(source.len()));

    loop {
        match reader.read_event().ok()? {
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                if VOID_ELEMENTS.contains(&name.as_str()) {
                    writer.write_event(Event::Empty(e)).ok()?;
                } else {
                    let end = e.to_end().into_owned();
                    writer.write_event(Event::Start(e)).ok()?;
                    writer.write_event(Event::End(end)).ok()?;
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                writer.write_event(Event::Text(BytesText::new(&text))).ok()?;
            }
            Event::Decl(_) | Event::PI(_) => {}
            Event::Eof => break,
            event => writer.write_event(event).ok()?,
        }
    }

    String::from_utf8(writer.into_inner()).ok()
}

/// Parse a fragment of HTML as the content of a `<body>`.
pub fn parse_fragment(html: &str) -> RcDom {
    let wrapped = format!("<!DOCTYPE html><html><head></head><body>{html}</body></html>");
    parse_html(&wrapped)
}

/// Serialize only the children of a node (its "inner HTML").
pub fn inner_html(handle: &Handle) -> String {
    let mut bytes = Vec::new();
    let serializable: SerializableHandle = handle.clone().into();

    let opts = SerializeOpts {
        traversal_scope: TraversalScope::ChildrenOnly(None),
        ..Default::default()
    };

    if serialize(&mut bytes, &serializable, opts).is_err() {
        return String::new();
    }

    String::from_utf8(bytes).unwrap_or_default()
}

/// Get the first element with the given local name
pub fn find_first_element(handle: &Handle, name: &str) -> Option<Handle> {
    if let NodeData::Element { name: ref qname, .. } = handle.data
        && qname.local.as_ref() == name
    {
        return Some(handle.clone());
    }

    for child in handle.children.borrow().iter() {
        if let Some(found) = find_first_element(child, name) {
            return Some(found);
        }
    }

    None
}

/// The `<body>` of a parsed document, or the document node when there is none.
pub fn body_or_document(dom: &RcDom) -> Handle {
    find_first_element(&dom.document, "body").unwrap_or_else(|| dom.document.clone())
}

/// Get an attribute value from an element, matched by local name
pub fn get_attribute(handle: &Handle, attr_name: &str) -> Option<String> {
    if let NodeData::Element { ref attrs, .. } = handle.data {
        for attr in attrs.borrow().iter() {
            if attr.name.local.as_ref() == attr_name {
                return Some(attr.value.to_string());
            }
        }
    }
    None
}

/// Remove `removed` elements, comments and processing instructions from the
/// subtree, then merge the adjacent text nodes the removals left behind.
///
/// Returns the number of nodes removed.
pub fn sanitize(handle: &Handle, removed: &[&str]) -> usize {
    let mut count = 0;
    sanitize_recursive(handle, removed, &mut count);
    count
}

fn sanitize_recursive(handle: &Handle, removed: &[&str], count: &mut usize) {
    {
        let mut children = handle.children.borrow_mut();
        let before = children.len();
        children.retain(|child| match child.data {
            NodeData::Comment { .. } | NodeData::ProcessingInstruction { .. } => false,
            NodeData::Element { ref name, .. } => !removed.contains(&name.local.as_ref()),
            _ => true,
        });
        *count += before - children.len();
    }

    merge_adjacent_text(handle);

    for child in handle.children.borrow().iter() {
        sanitize_recursive(child, removed, count);
    }
}

fn merge_adjacent_text(handle: &Handle) {
    let mut children = handle.children.borrow_mut();
    let mut merged: Vec<Handle> = Vec::with_capacity(children.len());

    for child in children.drain(..) {
        if let NodeData::Text { ref contents } = child.data
            && let Some(prev) = merged.last()
            && let NodeData::Text {
                contents: ref prev_contents,
            } = prev.data
        {
            let mut extra = String::new();
            extra.push_str(&contents.borrow());
            prev_contents.borrow_mut().push_slice(&extra);
            continue;
        }
        merged.push(child);
    }

    *children = merged;
}

/// An element that references an image, with the attribute holding the reference.
fn image_reference_attr(handle: &Handle) -> Option<&'static str> {
    let NodeData::Element { ref name, .. } = handle.data else {
        return None;
    };

    match name.local.as_ref() {
        "img" if name.ns == ns!(html) => Some("src"),
        // Both `href` and `xlink:href` have local name "href"
        "image" if name.ns == ns!(svg) => Some("href"),
        _ => None,
    }
}

/// Rewrite every `img@src` and SVG `image@href` for which `resolve` returns a
/// replacement. References it returns `None` for are left untouched.
///
/// Returns `(rewritten, unresolved)` counts.
pub fn rewrite_image_refs<F>(handle: &Handle, resolve: &mut F) -> (usize, usize)
where
    F: FnMut(&str) -> Option<String>,
{
    let mut counts = (0, 0);
    rewrite_recursive(handle, resolve, &mut counts);
    counts
}

fn rewrite_recursive<F>(handle: &Handle, resolve: &mut F, counts: &mut (usize, usize))
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(attr_name) = image_reference_attr(handle)
        && let NodeData::Element { ref attrs, .. } = handle.data
    {
        for attr in attrs.borrow_mut().iter_mut() {
            if attr.name.local.as_ref() != attr_name || attr.value.is_empty() {
                continue;
            }
            match resolve(&attr.value) {
                Some(local) => {
                    attr.value = local.as_str().into();
                    counts.0 += 1;
                }
                None => counts.1 += 1,
            }
        }
    }

    for child in handle.children.borrow().iter() {
        rewrite_recursive(child, resolve, counts);
    }
}

/// The reference held by the first image element (`img` or SVG `image`) in
/// document order. `None` when there is no image element or its reference is
/// empty.
pub fn first_image_ref(handle: &Handle) -> Option<String> {
    let image = find_first_image(handle)?;
    let attr_name = image_reference_attr(&image)?;
    get_attribute(&image, attr_name).filter(|value| !value.is_empty())
}

fn find_first_image(handle: &Handle) -> Option<Handle> {
    if image_reference_attr(handle).is_some() {
        return Some(handle.clone());
    }

    for child in handle.children.borrow().iter() {
        if let Some(found) = find_first_image(child) {
            return Some(found);
        }
    }

    None
}

/// Get text content from a node, one space between text nodes, whitespace
/// collapsed.
pub fn get_text_content(handle: &Handle) -> String {
    let mut text = String::new();
    get_text_recursive(handle, &mut text);
    normalize_whitespace(&text)
}

fn get_text_recursive(handle: &Handle, text: &mut String) {
    match handle.data {
        NodeData::Text { ref contents } => {
            text.push_str(&contents.borrow());
            text.push(' ');
        }
        NodeData::Element { .. } | NodeData::Document => {
            for child in handle.children.borrow().iter() {
                get_text_recursive(child, text);
            }
        }
        _ => {}
    }
}

/// Plain text of a body fragment.
pub fn extract_plain_text(html: &str) -> String {
    let dom = parse_fragment(html);
    get_text_content(&body_or_document(&dom))
}

/// Collapse runs of whitespace to a single space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
