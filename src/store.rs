//! Persistence of an assembled [`Book`] inside its output location.
//!
//! ```text
//! <output>/
//!   book.json
//!   images/
//!     cover.jpg
//!     fig1.png
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::book::Book;
use crate::error::{Error, Result};

/// Name of the serialized book inside an output location.
pub const BOOK_FILE: &str = "book.json";

/// Directory holding extracted images inside an output location.
pub const IMAGES_DIR: &str = "images";

/// Path of the serialized book for an output location.
pub fn book_path(output_dir: &Path) -> PathBuf {
    output_dir.join(BOOK_FILE)
}

/// Whether an output location already holds a serialized book.
pub fn has_book(output_dir: &Path) -> bool {
    book_path(output_dir).is_file()
}

/// Write `book` as pretty-printed JSON to `<output_dir>/book.json`.
pub fn save_book(book: &Book, output_dir: &Path) -> Result<PathBuf> {
    let path = book_path(output_dir);
    let file = File::create(&path).map_err(|e| Error::output(&path, e))?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, book)?;
    writer.flush().map_err(|e| Error::output(&path, e))?;

    Ok(path)
}

/// Read a book previously written by [`save_book`].
pub fn load_book(output_dir: &Path) -> Result<Book> {
    let path = book_path(output_dir);
    let file = File::open(&path).map_err(|e| Error::input(&path, e))?;

    // Navigation trees can be nested far deeper than serde_json's default limit
    let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(file));
    deserializer.disable_recursion_limit();
    let book = Book::deserialize(&mut deserializer)?;
    deserializer.end()?;

    Ok(book)
}
