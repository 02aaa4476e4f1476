//! Error taxonomy of a pipeline run.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Boxed source error carried by the I/O variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Everything that can stop a run.
#[derive(Debug, Error)]
pub enum EtlError {
    /// The source could not be opened, decompressed or parsed.
    #[error("cannot ingest {}", .path.display())]
    Ingestion {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// An expected column is absent from the working table.
    #[error("expected column `{column}` is missing")]
    Schema { column: String },

    /// A surviving row's `date` does not match the expected format.
    #[error("row {row}: cannot parse date `{value}`")]
    DateParse {
        row: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// The destination could not be written.
    #[error("cannot write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

/// Coarse classification of an [`EtlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Ingestion,
    Schema,
    DateParse,
    Write,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ingestion => "IngestionError",
            Self::Schema => "SchemaError",
            Self::DateParse => "DateParseError",
            Self::Write => "WriteError",
        };
        f.write_str(s)
    }
}

impl EtlError {
    pub fn ingestion(path: impl AsRef<Path>, source: impl Into<BoxError>) -> Self {
        Self::Ingestion {
            path: path.as_ref().to_path_buf(),
            source: source.into(),
        }
    }

    pub fn schema(column: impl Into<String>) -> Self {
        Self::Schema {
            column: column.into(),
        }
    }

    pub fn write(path: impl AsRef<Path>, source: impl Into<BoxError>) -> Self {
        Self::Write {
            path: path.as_ref().to_path_buf(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ingestion { .. } => ErrorKind::Ingestion,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::DateParse { .. } => ErrorKind::DateParse,
            Self::Write { .. } => ErrorKind::Write,
        }
    }

    /// Render the error followed by its whole `source()` chain, one cause per line.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(c) = cause {
            out.push_str("\n  caused by: ");
            out.push_str(&c.to_string());
            cause = c.source();
        }
        out
    }
}
