use mantis_core::error::IngestError;
use thiserror::Error;

/// Errors raised by the SQLite session store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration { message: String },

    /// A replace-mode write failed after it began. The transaction was
    /// rolled back, but the caller must treat the upload as lost.
    #[error("replace aborted: {source}")]
    Replace {
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    pub(crate) fn replace(source: StoreError) -> Self {
        StoreError::Replace {
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Replace { source } => IngestError::ReplaceIncomplete(source.to_string()),
            other => IngestError::Store(other.to_string()),
        }
    }
}
