//! Ingesting many books in one run.
//!
//! Each book is independent: a failure is recorded in its [`BookResult`] and
//! the batch carries on. Two inputs that map to the same output directory are
//! never both written; the later one fails.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{error, info, warn};

use super::{IngestOptions, Ingestion, ingest};
use crate::error::{Error, Result};
use crate::store;

/// Options for [`ingest_batch`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Where `<stem>_data` directories go; next to each EPUB when `None`.
    pub output_root: Option<PathBuf>,
    /// Skip books whose output location already holds a `book.json`.
    pub skip_existing: bool,
    /// Books ingested concurrently.
    pub jobs: usize,
    pub ingest: IngestOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_root: None,
            skip_existing: false,
            jobs: 1,
            ingest: IngestOptions::default(),
        }
    }
}

/// Counts describing one ingested book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookReport {
    pub title: String,
    pub authors: Vec<String>,
    pub chapters: usize,
    pub toc_entries: usize,
    pub images: usize,
    pub cover_image: Option<String>,
    pub diagnostics: Vec<String>,
}

impl From<&Ingestion> for BookReport {
    fn from(ingestion: &Ingestion) -> Self {
        let book = &ingestion.book;
        Self {
            title: book.metadata().title.clone(),
            authors: book.metadata().authors.clone(),
            chapters: book.spine().len(),
            toc_entries: book.toc().len(),
            images: book.images().len(),
            cover_image: book.cover_image().map(str::to_string),
            diagnostics: ingestion.diagnostics.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookOutcome {
    Ingested(BookReport),
    /// Output already present and `skip_existing` was set.
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookResult {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub outcome: BookOutcome,
}

/// Outcomes of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub books: Vec<BookResult>,
}

impl BatchSummary {
    pub fn ingested(&self) -> usize {
        self.count(|o| matches!(o, BookOutcome::Ingested(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, BookOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, BookOutcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, pred: impl Fn(&BookOutcome) -> bool) -> usize {
        self.books.iter().filter(|b| pred(&b.outcome)).count()
    }
}

/// Every `*.epub` directly inside `dir`, sorted by path.
pub fn discover_epubs(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| Error::input(dir, e))?;

    let mut epubs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::input(dir, e))?.path();
        let is_epub = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"));
        if is_epub && path.is_file() {
            epubs.push(path);
        }
    }

    epubs.sort();
    Ok(epubs)
}

/// `<stem>_data`, next to the EPUB or under `output_root`.
///
/// ```
/// use std::path::Path;
/// use epub_ingest::ingest::output_dir_for;
///
/// assert_eq!(
///     output_dir_for(Path::new("books/moby.epub"), None),
///     Path::new("books/moby_data")
/// );
/// assert_eq!(
///     output_dir_for(Path::new("books/moby.epub"), Some(Path::new("out"))),
///     Path::new("out/moby_data")
/// );
/// ```
pub fn output_dir_for(epub: &Path, output_root: Option<&Path>) -> PathBuf {
    let stem = epub
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("{stem}_data");

    match output_root {
        Some(root) => root.join(name),
        None => epub.parent().unwrap_or(Path::new("")).join(name),
    }
}

/// One book of a batch, with its output location settled up front.
struct Job<'a> {
    source: &'a Path,
    output_dir: PathBuf,
    /// Earlier input already writing to `output_dir`.
    taken_by: Option<&'a Path>,
}

fn plan_jobs<'a>(paths: &'a [PathBuf], output_root: Option<&Path>) -> Vec<Job<'a>> {
    let mut owners: HashMap<PathBuf, &'a Path> = HashMap::new();

    paths
        .iter()
        .map(|path| {
            let output_dir = output_dir_for(path, output_root);
            let taken_by = match owners.entry(output_dir.clone()) {
                Entry::Occupied(owner) => Some(*owner.get()),
                Entry::Vacant(slot) => {
                    slot.insert(path);
                    None
                }
            };
            Job {
                source: path,
                output_dir,
                taken_by,
            }
        })
        .collect()
}

/// Ingest every path, reporting each outcome in input order.
pub fn ingest_batch(paths: &[PathBuf], options: &BatchOptions) -> BatchSummary {
    info!(books = paths.len(), jobs = options.jobs, "starting batch");

    let jobs = plan_jobs(paths, options.output_root.as_deref());
    let run_one = |job: &Job<'_>| ingest_one(job, options);

    let books: Vec<BookResult> = if options.jobs > 1 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(options.jobs)
            .build()
        {
            Ok(pool) => pool.install(|| jobs.par_iter().map(run_one).collect()),
            Err(e) => {
                warn!(error = %e, "cannot start worker threads; ingesting sequentially");
                jobs.iter().map(run_one).collect()
            }
        }
    } else {
        jobs.iter().map(run_one).collect()
    };

    let summary = BatchSummary { books };
    info!(
        ingested = summary.ingested(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "batch finished"
    );
    summary
}

fn ingest_one(job: &Job<'_>, options: &BatchOptions) -> BookResult {
    let path = job.source;
    let output_dir = &job.output_dir;

    let outcome = if let Some(owner) = job.taken_by {
        error!(
            path = %path.display(),
            output = %output_dir.display(),
            owner = %owner.display(),
            "output directory already used by another book"
        );
        BookOutcome::Failed {
            reason: format!(
                "output directory {} is already used by {}",
                output_dir.display(),
                owner.display()
            ),
        }
    } else if options.skip_existing && store::has_book(output_dir) {
        info!(path = %path.display(), "skipping (already processed)");
        BookOutcome::Skipped
    } else {
        match ingest(path, output_dir, &options.ingest) {
            Ok(ingestion) => {
                info!(path = %path.display(), title = %ingestion.book.metadata().title, "done");
                BookOutcome::Ingested(BookReport::from(&ingestion))
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "ingestion failed");
                BookOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    };

    BookResult {
        source: path.to_path_buf(),
        output_dir: output_dir.clone(),
        outcome,
    }
}
