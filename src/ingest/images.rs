use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::debug;

use super::{Diagnostic, report};
use crate::book::ImageAssetMap;
use crate::epub::{Container, ManifestItem};
use crate::error::{Error, Result};
use crate::store::IMAGES_DIR;
use crate::util::basename;

/// An image written to the output location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    pub id: String,
    /// Full archive path of the source resource.
    pub path: String,
    /// `images/<file name>`, relative to the output location.
    pub local_path: String,
}

/// Images written by [`extract_images`] and the map that resolves references to them.
#[derive(Debug, Clone, Default)]
pub struct ImageAssets {
    pub map: ImageAssetMap,
    /// Written images in manifest order.
    pub extracted: Vec<ExtractedImage>,
}

/// Keep only alphanumerics, `.`, `_` and `-`.
///
/// Names left without a usable stem become `image`, keeping any extension.
///
/// ```
/// use epub_ingest::ingest::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("fig 1 (a).png"), "fig1a.png");
/// assert_eq!(sanitize_file_name("★.png"), "image.png");
/// ```
pub fn sanitize_file_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let (stem, ext) = match safe.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (safe.as_str(), None),
    };

    if stem.trim_matches('.').is_empty() {
        return match ext {
            Some(ext) if !ext.is_empty() => format!("image.{ext}"),
            _ => "image".to_string(),
        };
    }

    safe
}

/// First free variant of `name`: `name.ext`, `name-1.ext`, `name-2.ext`, ...
///
/// Comparison is case-insensitive so names stay distinct on case-folding
/// filesystems.
fn unique_file_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_lowercase()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (name, String::new()),
    };

    let mut n = 1;
    loop {
        let candidate = format!("{stem}-{n}{ext}");
        if taken.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

/// Write every manifest image into `images_dir` and index the references
/// that may point at it.
///
/// Exact keys (decoded href, raw href, full path) are registered for all
/// images before any basename key, so a shared basename never shadows an
/// exact path. Images whose bytes are missing or cannot be written are
/// reported and left out of the map.
pub fn extract_images(
    container: &Container,
    images_dir: &Path,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<ImageAssets> {
    fs::create_dir_all(images_dir).map_err(|e| Error::output(images_dir, e))?;

    let mut taken = HashSet::new();
    let mut written: Vec<(&ManifestItem, String)> = Vec::new();

    for item in container.images() {
        let Some(data) = item.data() else {
            report(
                diagnostics,
                Diagnostic::MissingResource {
                    href: item.href.clone(),
                },
            );
            continue;
        };

        let sanitized = sanitize_file_name(basename(&item.href));
        let file_name = unique_file_name(&sanitized, &mut taken);
        let local_path = format!("{IMAGES_DIR}/{file_name}");

        if let Err(e) = fs::write(images_dir.join(&file_name), data) {
            taken.remove(&file_name.to_lowercase());
            report(
                diagnostics,
                Diagnostic::ImageNotWritten {
                    href: item.href.clone(),
                    reason: e.to_string(),
                },
            );
            continue;
        }

        if file_name != sanitized {
            report(
                diagnostics,
                Diagnostic::ImageRenamed {
                    href: item.href.clone(),
                    local_path: local_path.clone(),
                },
            );
        }

        debug!(href = %item.href, %local_path, bytes = data.len(), "extracted image");
        written.push((item, local_path));
    }

    let mut map = ImageAssetMap::new();
    for (item, local_path) in &written {
        map.register(item.href.as_str(), local_path.as_str());
        map.register(item.raw_href.as_str(), local_path.as_str());
        map.register(item.path.as_str(), local_path.as_str());
    }
    for (item, local_path) in &written {
        map.register(basename(&item.href), local_path.as_str());
        map.register(basename(&item.raw_href), local_path.as_str());
    }

    let extracted = written
        .into_iter()
        .map(|(item, local_path)| ExtractedImage {
            id: item.id.clone(),
            path: item.path.clone(),
            local_path,
        })
        .collect();

    Ok(ImageAssets { map, extracted })
}
