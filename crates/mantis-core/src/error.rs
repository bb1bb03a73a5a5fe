use std::path::PathBuf;
use thiserror::Error;

use crate::models::CsvSchema;

/// Coarse classification of an [`IngestError`], used to pick the response
/// status and to decide whether any store mutation may have happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required upload was not attached.
    InputMissing,
    /// The upload parsed but no row survived filtering.
    ValidationEmpty,
    /// The rows contradict each other (e.g. negative session length).
    ValidationInconsistent,
    /// Reading the upload or the scratch file failed.
    IoFailure,
    /// The relational store rejected a read or write.
    StoreFailure,
    /// Heart-rate data could not be attached to a session.
    LinkFailure,
}

impl ErrorKind {
    /// HTTP status code reported for this kind of failure.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InputMissing
            | ErrorKind::ValidationEmpty
            | ErrorKind::ValidationInconsistent
            | ErrorKind::LinkFailure => 400,
            ErrorKind::IoFailure | ErrorKind::StoreFailure => 500,
        }
    }
}

/// All errors produced while ingesting a MANTIS or heart-rate upload.
#[derive(Error, Debug)]
pub enum IngestError {
    /// No file was attached under the named multipart field.
    #[error("No file uploaded for field '{0}'")]
    InputMissing(String),

    /// The same multipart field carried more than one file.
    #[error("Field '{0}' was sent more than once; upload one file per field")]
    DuplicateField(String),

    /// Every row was dropped by the schema filter (or the file was empty).
    #[error("No valid rows found in {schema} upload")]
    NoValidRows { schema: CsvSchema },

    /// The surviving rows cannot form a consistent record.
    #[error("Inconsistent data: {0}")]
    Inconsistent(String),

    /// The scratch copy of a cleaned upload could not be written or read.
    #[error("Scratch file {path} failed: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Pass-through for raw I/O errors on the upload stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A store read or append failed; nothing was replaced.
    #[error("Store error: {0}")]
    Store(String),

    /// A replace-mode write failed after it started. The sessions table may
    /// no longer hold the previous batch, so the upload must be repeated.
    #[error("Session replace failed ({0}); please re-upload the MANTIS file")]
    ReplaceIncomplete(String),

    /// Heart-rate data arrived before any session exists.
    #[error("No session available to link heart-rate data to; upload a MANTIS file first")]
    NoSessionAvailable,

    /// An explicit session reference named a session that is not stored.
    #[error("Session {0} does not exist")]
    UnknownSession(i64),
}

impl IngestError {
    /// Classify the error into the ingestion taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::InputMissing(_) => ErrorKind::InputMissing,
            IngestError::NoValidRows { .. } => ErrorKind::ValidationEmpty,
            IngestError::DuplicateField(_) | IngestError::Inconsistent(_) => {
                ErrorKind::ValidationInconsistent
            }
            IngestError::Scratch { .. } | IngestError::Io(_) => ErrorKind::IoFailure,
            IngestError::Store(_) | IngestError::ReplaceIncomplete(_) => ErrorKind::StoreFailure,
            IngestError::NoSessionAvailable | IngestError::UnknownSession(_) => {
                ErrorKind::LinkFailure
            }
        }
    }

    /// Shorthand for `self.kind().http_status()`.
    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }
}

/// Convenience alias used throughout the ingestion crates.
pub type Result<T> = std::result::Result<T, IngestError>;
