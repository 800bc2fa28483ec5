//! Error types for the tracker.

/// Tracker error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed transaction or output data handed to the matcher.
    #[error("Invalid transaction data: {0}")]
    TransactionData(String),

    #[error(transparent)]
    Store(#[from] coinwatch_store::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown chain: {0}")]
    UnknownChain(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
