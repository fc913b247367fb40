use tracing::debug;

use crate::book::ImageAssetMap;
use crate::epub::{Container, ManifestItem};
use crate::transform::html::{first_image_ref, parse_content_document};
use crate::util::decode_document;

/// Which detection tier found the cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverSource {
    /// Declared in the package (`cover-image` property or `<meta name="cover">`).
    Declared,
    /// An image whose path contains "cover".
    NameHeuristic,
    /// The first image element of the first content document.
    FirstDocumentImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    /// Value from the image asset map, e.g. `images/cover.jpg`.
    pub local_path: String,
    pub source: CoverSource,
}

/// Find the cover image among the extracted images.
///
/// Tiers are tried in order and the first hit wins. Only images present in
/// `images` can be returned.
pub fn detect_cover(container: &Container, images: &ImageAssetMap) -> Option<Cover> {
    let found = declared(container, images)
        .map(|path| (path, CoverSource::Declared))
        .or_else(|| by_name(container, images).map(|path| (path, CoverSource::NameHeuristic)))
        .or_else(|| {
            first_document_image(container, images)
                .map(|path| (path, CoverSource::FirstDocumentImage))
        })?;

    Some(Cover {
        local_path: found.0.to_string(),
        source: found.1,
    })
}

fn lookup<'a>(images: &'a ImageAssetMap, item: &ManifestItem) -> Option<&'a str> {
    images.get(&item.href).or_else(|| images.get(&item.path))
}

fn declared<'a>(container: &Container, images: &'a ImageAssetMap) -> Option<&'a str> {
    let item = container.declared_cover()?;
    let path = lookup(images, item);
    if path.is_none() {
        debug!(id = %item.id, href = %item.href, "declared cover was not extracted");
    }
    path
}

fn by_name<'a>(container: &Container, images: &'a ImageAssetMap) -> Option<&'a str> {
    container
        .images()
        .filter(|item| {
            item.href.to_lowercase().contains("cover") || item.path.to_lowercase().contains("cover")
        })
        .find_map(|item| lookup(images, item))
}

fn first_document_image<'a>(container: &Container, images: &'a ImageAssetMap) -> Option<&'a str> {
    // Only the first content document is inspected; the navigation document
    // is not content
    let document = container
        .documents()
        .find(|item| !item.has_property("nav"))?;

    let source = decode_document(document.data()?);
    let dom = parse_content_document(&source);
    let reference = first_image_ref(&dom.document)?;

    images.resolve(&reference, document.href_dir())
}
