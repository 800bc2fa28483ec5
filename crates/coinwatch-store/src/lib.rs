//! Partitioned key-value storage for coinwatch.
//!
//! This crate emulates a partition/row keyed store on a relational database
//! (PostgreSQL or SQLite), providing:
//! - Point lookups and ordered prefix scans within a partition
//! - Soft deletion, with an optional hard-delete mode
//! - Lazy loading of row values
//! - Staged writes committed atomically in one transaction

mod backend;
mod codec;
mod config;
mod error;
mod key;
mod record;
mod schema;
mod store;

pub use backend::{PendingWrite, TABLE};
pub use codec::{CodecError, StoreValue, Value, ValueKind};
pub use config::{DATABASE_URL_ENV, FALLBACK_DATABASE_URL_ENV, StoreConfig};
pub use error::{Error, Result};
pub use key::{CompositeKey, KeyFormatError, SEPARATOR};
pub use record::{Record, RecordValue};
pub use store::{PartitionedStore, StoreStats};
