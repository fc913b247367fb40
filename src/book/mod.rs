//! The normalized reading model produced by ingestion.
//!
//! A [`Book`] owns everything a reader needs: metadata, chapter content in
//! reading order, the navigation tree and the image asset index. It is built
//! once by the assembler and is read-only afterwards; it is also the unit of
//! serialization (see [`crate::store`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::util::{basename, is_external, percent_decode, resolve_relative_path, strip_fragment};

/// Version tag stamped on every assembled [`Book`].
pub const FORMAT_VERSION: &str = "3.0";

/// Title used when the package declares none.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Language used when the package declares none.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Book metadata (Dublin Core subset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub language: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub date: Option<String>,
    pub identifiers: Vec<String>,
    pub subjects: Vec<String>,
}

impl Default for BookMetadata {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            authors: Vec::new(),
            description: None,
            publisher: None,
            date: None,
            identifiers: Vec::new(),
            subjects: Vec::new(),
        }
    }
}

/// A logical entry in the navigation tree.
///
/// `href` is kept as found in the navigation source; `file_href` and `anchor`
/// are its two halves around the first `#`. `file_href` is the join key back
/// to [`ChapterContent::href`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEntry {
    pub title: String,
    pub href: String,
    pub file_href: String,
    pub anchor: String,
    pub children: Vec<NavigationEntry>,
}

impl NavigationEntry {
    /// Create a leaf entry, splitting `href` into file and anchor parts.
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        let href = href.into();
        let (file_href, anchor) = split_href(&href);
        Self {
            title: title.into(),
            file_href: file_href.to_string(),
            anchor: anchor.to_string(),
            href,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<NavigationEntry>) -> Self {
        self.children = children;
        self
    }

    /// Total number of entries in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(NavigationEntry::count).sum::<usize>()
    }
}

/// Split an href at the first `#` into `(file, anchor)`.
///
/// The anchor is empty when there is no `#`.
///
/// ```
/// use epub_ingest::book::split_href;
///
/// assert_eq!(split_href("chap1.html#sec2"), ("chap1.html", "sec2"));
/// assert_eq!(split_href("chap1.html"), ("chap1.html", ""));
/// ```
pub fn split_href(href: &str) -> (&str, &str) {
    href.split_once('#').unwrap_or((href, ""))
}

/// One spine document after sanitization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterContent {
    /// Manifest identifier.
    pub id: String,
    /// Manifest href; matches [`NavigationEntry::file_href`].
    pub href: String,
    /// Placeholder ("Section N"); real titles live in the navigation tree.
    pub title: String,
    /// Sanitized inner-body markup with image references rewritten.
    pub content: String,
    /// Whitespace-normalized plain text of `content`.
    pub text: String,
    /// Zero-based position in the reading order.
    pub order: usize,
}

/// Maps every observed image reference to a local relative path.
///
/// Many keys (full archive path, manifest href, basename, decoded forms) point
/// to the same `images/<name>` value. Backed by an ordered map so serialized
/// output is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageAssetMap(BTreeMap<String, String>);

impl ImageAssetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` unless it is already mapped. Returns whether it was added.
    pub fn register(&mut self, key: impl Into<String>, local_path: impl Into<String>) -> bool {
        let key = key.into();
        if key.is_empty() || self.0.contains_key(&key) {
            return false;
        }
        self.0.insert(key, local_path.into());
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Resolve a reference found in markup.
    ///
    /// The reference is percent-decoded and stripped of any fragment or query,
    /// then looked up as-is, relative to `base_dir` (the directory of the
    /// referencing document), and finally by basename. External URLs never
    /// resolve.
    pub fn resolve(&self, reference: &str, base_dir: &str) -> Option<&str> {
        if is_external(reference) {
            return None;
        }

        let decoded = percent_decode(strip_fragment(reference));
        if decoded.is_empty() {
            return None;
        }

        self.get(&decoded)
            .or_else(|| self.get(&resolve_relative_path(base_dir, &decoded)))
            .or_else(|| self.get(basename(&decoded)))
    }

    /// Distinct local paths, sorted.
    pub fn local_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.0.values().map(String::as_str).collect();
        paths.sort_unstable();
        paths.dedup();
        paths
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The assembled book: aggregate root of the reading model.
///
/// Fields are private; a `Book` is produced by [`Book::assemble`] (or by
/// deserialization) and only read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    metadata: BookMetadata,
    spine: Vec<ChapterContent>,
    toc: Vec<NavigationEntry>,
    images: ImageAssetMap,
    source_file: String,
    processed_at: String,
    version: String,
    cover_image: Option<String>,
}

/// Everything the assembler combines into a [`Book`].
#[derive(Debug, Clone)]
pub struct BookParts {
    pub metadata: BookMetadata,
    pub spine: Vec<ChapterContent>,
    pub toc: Vec<NavigationEntry>,
    pub images: ImageAssetMap,
    pub source_file: String,
    pub processed_at: String,
    pub cover_image: Option<String>,
}

impl Book {
    /// Combine the pipeline outputs and stamp the format version.
    ///
    /// No validation happens here beyond what the upstream stages guarantee.
    pub fn assemble(parts: BookParts) -> Self {
        let BookParts {
            metadata,
            spine,
            toc,
            images,
            source_file,
            processed_at,
            cover_image,
        } = parts;

        Self {
            metadata,
            spine,
            toc,
            images,
            source_file,
            processed_at,
            version: FORMAT_VERSION.to_string(),
            cover_image,
        }
    }

    pub fn metadata(&self) -> &BookMetadata {
        &self.metadata
    }

    /// Chapters in reading order.
    pub fn spine(&self) -> &[ChapterContent] {
        &self.spine
    }

    pub fn chapter(&self, index: usize) -> Option<&ChapterContent> {
        self.spine.get(index)
    }

    /// Position of the chapter whose href matches a navigation entry's `file_href`.
    pub fn chapter_index_for(&self, file_href: &str) -> Option<usize> {
        self.spine.iter().position(|c| c.href == file_href)
    }

    pub fn toc(&self) -> &[NavigationEntry] {
        &self.toc
    }

    pub fn images(&self) -> &ImageAssetMap {
        &self.images
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    pub fn processed_at(&self) -> &str {
        &self.processed_at
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn cover_image(&self) -> Option<&str> {
        self.cover_image.as_deref()
    }
}
