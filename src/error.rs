//! Error types for ingestion.
//!
//! Only a [`ContainerError`] aborts the ingestion of a book. Everything that
//! merely reduces the output (a dangling spine reference, a missing cover, an
//! unreadable navigation document) is reported as a
//! [`Diagnostic`](crate::ingest::Diagnostic) instead.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while opening an EPUB container.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("Missing required element: {0}")]
    MissingElement(String),
}

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum Error {
    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    #[error("cannot write output at {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Output {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn input(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Input {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
