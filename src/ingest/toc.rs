use super::{Diagnostic, report};
use crate::book::NavigationEntry;
use crate::epub::{Container, NavNode, NavShape};
use crate::util::basename;

/// Deepest navigation level kept; deeper nodes are dropped with their subtrees.
pub const MAX_NAV_DEPTH: usize = 500;

/// Build the navigation tree, falling back to a flat list of the manifest's
/// documents when the book has no usable navigation.
pub fn build_toc(container: &Container, diagnostics: &mut Vec<Diagnostic>) -> Vec<NavigationEntry> {
    if let Some(reason) = container.navigation_error() {
        report(
            diagnostics,
            Diagnostic::NavigationUnreadable {
                reason: reason.to_string(),
            },
        );
    }

    let toc = convert_nodes(container.navigation(), 1, diagnostics);
    if !toc.is_empty() {
        return toc;
    }

    let fallback = fallback_toc(container);
    report(
        diagnostics,
        Diagnostic::EmptyNavigation {
            fallback_entries: fallback.len(),
        },
    );
    fallback
}

fn convert_nodes(
    nodes: &[NavNode],
    depth: usize,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<NavigationEntry> {
    let mut entries = Vec::with_capacity(nodes.len());

    for node in nodes {
        if depth > MAX_NAV_DEPTH {
            report(
                diagnostics,
                Diagnostic::NavigationTooDeep {
                    title: node.title.clone(),
                    depth,
                },
            );
            continue;
        }

        let entry = match node.shape() {
            NavShape::Leaf { title, href } => NavigationEntry::new(entry_title(title, href), href),
            NavShape::Branch {
                title,
                href,
                children,
            } => {
                let href = href.unwrap_or_default();
                NavigationEntry::new(entry_title(title, href), href)
                    .with_children(convert_nodes(children, depth + 1, diagnostics))
            }
        };
        entries.push(entry);
    }

    entries
}

fn entry_title(title: &str, href: &str) -> String {
    if title.is_empty() && !href.is_empty() {
        humanize_file_name(href)
    } else {
        title.to_string()
    }
}

/// One entry per manifest document, in manifest order, titled after its file name.
pub fn fallback_toc(container: &Container) -> Vec<NavigationEntry> {
    container
        .documents()
        .map(|item| NavigationEntry::new(humanize_file_name(&item.href), item.href.as_str()))
        .collect()
}

/// Turn a document href into a readable title.
///
/// `"text/chapter_one.xhtml"` becomes `"Chapter One"`: the basename loses its
/// `.xhtml`/`.html` extension, underscores become spaces, and words are title
/// cased (a letter following a non-letter is upper-cased, every other letter
/// lower-cased).
pub fn humanize_file_name(href: &str) -> String {
    let name = basename(href.split('#').next().unwrap_or(href))
        .replace(".xhtml", "")
        .replace(".html", "")
        .replace('_', " ");

    let mut title = String::with_capacity(name.len());
    let mut previous_is_letter = false;
    for c in name.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                title.extend(c.to_lowercase());
            } else {
                title.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            title.push(c);
            previous_is_letter = false;
        }
    }
    title
}
