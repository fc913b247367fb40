use std::collections::HashSet;

use tracing::debug;

use super::{Diagnostic, report};
use crate::book::{ChapterContent, ImageAssetMap};
use crate::epub::Container;
use crate::transform::html::{
    REMOVED_ELEMENTS, body_or_document, extract_plain_text, inner_html, parse_content_document,
    rewrite_image_refs, sanitize,
};
use crate::util::decode_document;

/// Produce one [`ChapterContent`] per spine document, in reading order.
///
/// Spine entries that cannot be turned into a chapter are reported and
/// skipped; `order` and the placeholder title count only emitted chapters.
pub fn normalize_chapters(
    container: &Container,
    images: &ImageAssetMap,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ChapterContent> {
    let mut chapters: Vec<ChapterContent> = Vec::with_capacity(container.spine().len());
    let mut seen = HashSet::new();

    for spine_ref in container.spine() {
        let idref = &spine_ref.idref;

        let Some(item) = container.item(idref) else {
            report(
                diagnostics,
                Diagnostic::DanglingSpineReference {
                    idref: idref.clone(),
                },
            );
            continue;
        };

        if !item.is_document() {
            report(
                diagnostics,
                Diagnostic::NonDocumentSpineItem {
                    idref: idref.clone(),
                    media_type: item.media_type.clone(),
                },
            );
            continue;
        }

        if !seen.insert(item.href.as_str()) {
            report(
                diagnostics,
                Diagnostic::DuplicateSpineItem {
                    idref: idref.clone(),
                    href: item.href.clone(),
                },
            );
            continue;
        }

        let Some(data) = item.data() else {
            report(
                diagnostics,
                Diagnostic::MissingResource {
                    href: item.href.clone(),
                },
            );
            continue;
        };

        let content = normalize_document(data, item.href_dir(), images);
        let text = extract_plain_text(&content);
        let order = chapters.len();

        debug!(
            href = %item.href,
            order,
            linear = spine_ref.linear,
            chars = text.len(),
            "processed chapter"
        );

        chapters.push(ChapterContent {
            id: item.id.clone(),
            href: item.href.clone(),
            title: format!("Section {}", order + 1),
            content,
            text,
            order,
        });
    }

    chapters
}

/// Sanitize a content document and return its body markup with image
/// references rewritten to local paths.
///
/// `base_dir` is the document's directory relative to the package document;
/// relative image references are resolved against it.
pub fn normalize_document(bytes: &[u8], base_dir: &str, images: &ImageAssetMap) -> String {
    let source = decode_document(bytes);
    let dom = parse_content_document(&source);
    let body = body_or_document(&dom);

    sanitize(&body, REMOVED_ELEMENTS);

    let (rewritten, unresolved) = rewrite_image_refs(&body, &mut |reference: &str| {
        images.resolve(reference, base_dir).map(str::to_string)
    });
    if unresolved > 0 {
        debug!(rewritten, unresolved, "image references left unchanged");
    }

    inner_html(&body)
}
