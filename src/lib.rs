//! # epub-ingest
//!
//! Turns EPUB files into a self-contained reading model: sanitized chapter
//! markup in reading order, a navigation tree, extracted images and
//! normalized metadata, persisted as `book.json` next to an `images/`
//! directory.
//!
//! ## Quick Start
//!
//! ```no_run
//! use epub_ingest::{IngestOptions, ingest};
//!
//! let result = ingest("moby-dick.epub", "moby-dick_data", &IngestOptions::default()).unwrap();
//! let book = &result.book;
//!
//! println!("{} by {}", book.metadata().title, book.metadata().authors.join(", "));
//! for chapter in book.spine() {
//!     println!("{}: {} chars", chapter.href, chapter.text.len());
//! }
//! for diagnostic in &result.diagnostics {
//!     eprintln!("warning: {diagnostic}");
//! }
//! ```
//!
//! ## Reading a processed book
//!
//! ```no_run
//! use std::path::Path;
//! use epub_ingest::store::load_book;
//!
//! let book = load_book(Path::new("moby-dick_data")).unwrap();
//! for entry in book.toc() {
//!     let chapter = book.chapter_index_for(&entry.file_href);
//!     println!("{} -> {:?} #{}", entry.title, chapter, entry.anchor);
//! }
//! ```

pub mod book;
pub mod epub;
pub mod error;
pub mod ingest;
pub mod store;
pub mod transform;
pub(crate) mod util;

pub use book::{Book, BookMetadata, ChapterContent, ImageAssetMap, NavigationEntry};
pub use epub::Container;
pub use error::{ContainerError, Error, Result};
pub use ingest::{
    BatchOptions, BatchSummary, Diagnostic, IngestOptions, Ingestion, ingest, ingest_batch,
    ingest_reader,
};
