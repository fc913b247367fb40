//! The ingestion pipeline: one EPUB in, one output location out.
//!
//! ```text
//! Container ─┬─> metadata ──────────────────────────┐
//!            ├─> images ──┬─> chapters ──────────────┤
//!            │            └─> cover ─────────────────┼─> Book ─> book.json
//!            └─> navigation ─> toc ──────────────────┘
//! ```
//!
//! Opening the container is the only fatal step. Everything that merely
//! degrades the result is collected as a [`Diagnostic`] and returned next to
//! the [`Book`] in an [`Ingestion`].

mod batch;
mod chapters;
mod cover;
mod images;
mod metadata;
mod toc;

use std::fmt;
use std::fs;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::book::{Book, BookParts};
use crate::epub::Container;
use crate::error::{Error, Result};
use crate::store::{self, IMAGES_DIR};
use crate::util::format_timestamp;

pub use batch::{
    BatchOptions, BatchSummary, BookOutcome, BookReport, BookResult, discover_epubs,
    ingest_batch, output_dir_for,
};
pub use chapters::{normalize_chapters, normalize_document};
pub use cover::{Cover, CoverSource, detect_cover};
pub use images::{ExtractedImage, ImageAssets, extract_images, sanitize_file_name};
pub use metadata::{is_recognized_date, normalize_metadata};
pub use toc::{MAX_NAV_DEPTH, build_toc, fallback_toc, humanize_file_name};

/// A condition that reduced the output without stopping ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A spine entry names a manifest id that does not exist.
    DanglingSpineReference { idref: String },
    /// A spine entry points at something that is not a content document.
    NonDocumentSpineItem { idref: String, media_type: String },
    /// A spine entry repeats a document that was already emitted.
    DuplicateSpineItem { idref: String, href: String },
    /// A manifest item is declared but its file is not in the archive.
    MissingResource { href: String },
    /// The navigation source exists but could not be parsed.
    NavigationUnreadable { reason: String },
    /// No navigation was available; a flat table of contents was synthesized.
    EmptyNavigation { fallback_entries: usize },
    /// A navigation node nested beyond [`MAX_NAV_DEPTH`] was dropped.
    NavigationTooDeep { title: String, depth: usize },
    /// An image could not be written to the output location.
    ImageNotWritten { href: String, reason: String },
    /// An image was stored under a different name to avoid a collision.
    ImageRenamed { href: String, local_path: String },
    /// The publication date is kept verbatim but is not a recognized form.
    UnparsableDate { value: String },
    /// No cover image could be found.
    NoCover,
}

impl Diagnostic {
    /// Informational diagnostics describe a choice that was made, not lost content.
    pub fn is_informational(&self) -> bool {
        matches!(self, Diagnostic::ImageRenamed { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DanglingSpineReference { idref } => {
                write!(f, "spine references unknown manifest id '{idref}'")
            }
            Diagnostic::NonDocumentSpineItem { idref, media_type } => {
                write!(f, "spine item '{idref}' is not a document ({media_type})")
            }
            Diagnostic::DuplicateSpineItem { idref, href } => {
                write!(f, "spine item '{idref}' repeats {href}")
            }
            Diagnostic::MissingResource { href } => {
                write!(f, "{href} is declared but missing from the archive")
            }
            Diagnostic::NavigationUnreadable { reason } => {
                write!(f, "navigation unreadable: {reason}")
            }
            Diagnostic::EmptyNavigation { fallback_entries } => write!(
                f,
                "no navigation found; built {fallback_entries} entries from the manifest"
            ),
            Diagnostic::NavigationTooDeep { title, depth } => {
                write!(f, "navigation entry '{title}' at depth {depth} dropped")
            }
            Diagnostic::ImageNotWritten { href, reason } => {
                write!(f, "image {href} not written: {reason}")
            }
            Diagnostic::ImageRenamed { href, local_path } => {
                write!(f, "image {href} stored as {local_path}")
            }
            Diagnostic::UnparsableDate { value } => {
                write!(f, "unrecognized publication date '{value}'")
            }
            Diagnostic::NoCover => write!(f, "no cover image detected"),
        }
    }
}

/// Log and record a diagnostic.
pub(crate) fn report(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    if diagnostic.is_informational() {
        debug!("{diagnostic}");
    } else {
        warn!("{diagnostic}");
    }
    diagnostics.push(diagnostic);
}

/// Options for a single ingestion.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Fixed processing timestamp; the current time when `None`.
    pub processed_at: Option<DateTime<Utc>>,
    /// Names of entries in the output location that survive the clear.
    pub preserve: Vec<String>,
    /// Persist `book.json` after assembly.
    pub write_book_file: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            processed_at: None,
            preserve: Vec::new(),
            write_book_file: true,
        }
    }
}

impl IngestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp every book with `at` instead of the current time.
    pub fn processed_at(mut self, at: DateTime<Utc>) -> Self {
        self.processed_at = Some(at);
        self
    }

    /// Keep `name` (a direct child of the output location) across re-ingestion.
    pub fn preserve(mut self, name: impl Into<String>) -> Self {
        self.preserve.push(name.into());
        self
    }

    pub fn write_book_file(mut self, write: bool) -> Self {
        self.write_book_file = write;
        self
    }
}

/// Result of a successful ingestion.
#[derive(Debug, Clone)]
pub struct Ingestion {
    pub book: Book,
    pub diagnostics: Vec<Diagnostic>,
    /// Which tier produced the cover, when one was found.
    pub cover_source: Option<CoverSource>,
    pub output_dir: PathBuf,
}

/// Ingest the EPUB at `path` into `output_dir`.
///
/// `output_dir` is cleared first (except for [`IngestOptions::preserve`]d
/// entries), but only once the container has been opened successfully.
pub fn ingest(
    path: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    options: &IngestOptions,
) -> Result<Ingestion> {
    let path = path.as_ref();
    let source_file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!(path = %path.display(), "loading");
    let container = Container::open(path)?;
    run(container, source_file, output_dir.as_ref(), options)
}

/// Ingest an EPUB read from memory or any other seekable source.
pub fn ingest_reader<R: Read + Seek>(
    reader: R,
    source_file: &str,
    output_dir: impl AsRef<Path>,
    options: &IngestOptions,
) -> Result<Ingestion> {
    info!(source = source_file, "loading");
    let container = Container::from_reader(reader)?;
    run(container, source_file.to_string(), output_dir.as_ref(), options)
}

fn run(
    container: Container,
    source_file: String,
    output_dir: &Path,
    options: &IngestOptions,
) -> Result<Ingestion> {
    let mut diagnostics = Vec::new();

    prepare_output_dir(output_dir, &options.preserve)?;

    let metadata = normalize_metadata(container.dublin_core(), &mut diagnostics);

    info!("extracting images");
    let images = extract_images(&container, &output_dir.join(IMAGES_DIR), &mut diagnostics)?;

    info!("parsing table of contents");
    let toc = build_toc(&container, &mut diagnostics);

    info!("processing chapters");
    let spine = normalize_chapters(&container, &images.map, &mut diagnostics);

    info!("detecting cover image");
    let cover = detect_cover(&container, &images.map);
    match &cover {
        Some(cover) => info!(path = %cover.local_path, source = ?cover.source, "found cover image"),
        None => report(&mut diagnostics, Diagnostic::NoCover),
    }

    let processed_at = format_timestamp(options.processed_at.unwrap_or_else(Utc::now));
    let cover_source = cover.as_ref().map(|c| c.source);

    let book = Book::assemble(BookParts {
        metadata,
        spine,
        toc,
        images: images.map,
        source_file,
        processed_at,
        cover_image: cover.map(|c| c.local_path),
    });

    if options.write_book_file {
        let path = store::save_book(&book, output_dir)?;
        info!(path = %path.display(), "saved structured data");
    }

    Ok(Ingestion {
        book,
        diagnostics,
        cover_source,
        output_dir: output_dir.to_path_buf(),
    })
}

/// Empty `output_dir` (keeping `preserve`d entries) and create it with its
/// images directory.
fn prepare_output_dir(output_dir: &Path, preserve: &[String]) -> Result<()> {
    if output_dir.exists() {
        if preserve.is_empty() {
            fs::remove_dir_all(output_dir).map_err(|e| Error::output(output_dir, e))?;
        } else {
            let entries = fs::read_dir(output_dir).map_err(|e| Error::output(output_dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| Error::output(output_dir, e))?;
                let name = entry.file_name();
                if preserve.iter().any(|keep| name.as_os_str() == keep.as_str()) {
                    debug!(name = %name.to_string_lossy(), "preserving");
                    continue;
                }

                let path = entry.path();
                let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
                let removed = if is_dir {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                removed.map_err(|e| Error::output(&path, e))?;
            }
        }
    }

    let images_dir = output_dir.join(IMAGES_DIR);
    fs::create_dir_all(&images_dir).map_err(|e| Error::output(&images_dir, e))?;
    Ok(())
}
