//! Transaction tracking for coinwatch.
//!
//! Matches transaction outputs against the scripts of tracked wallets,
//! records the matches in a [`coinwatch_store::PartitionedStore`] and
//! broadcasts a [`NewTransactionEvent`] for every transaction that paid to
//! a tracked source.

mod chain;
mod error;
mod events;
mod matcher;
mod models;
mod repository;
mod tracker;

pub use chain::{ChainId, ChainParams, ChainRegistry};
pub use error::{Error, Result};
pub use events::{DEFAULT_CAPACITY, EventEmitter};
pub use matcher::match_outputs;
pub use models::{
    Candidate, Coin, DerivationScheme, MatchedOutput, NewTransactionEvent, TrackedSource,
    TransactionData,
};
pub use repository::{DerivationFeature, MatchRecord, MatchRepository};
pub use tracker::{TrackedTransaction, Tracker};
