//! Error types for the partitioned store.

use crate::codec::CodecError;
use crate::key::KeyFormatError;

/// Store error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Partition or row key contains the reserved separator.
    #[error(transparent)]
    KeyFormat(#[from] KeyFormatError),

    /// Connectivity or query failure reported by the backend.
    #[error("Backend error: {0}")]
    Backend(#[from] sqlx::Error),

    /// Database or table creation failed.
    #[error("Schema bootstrap failed: {0}")]
    SchemaBootstrap(sqlx::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Invalid store configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the SQLSTATE code of a backend error, if any.
    pub fn sql_state(&self) -> Option<String> {
        match self {
            Self::Backend(err) | Self::SchemaBootstrap(err) => sql_state(err),
            _ => None,
        }
    }
}

pub(crate) fn sql_state(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|code| code.into_owned()),
        _ => None,
    }
}
