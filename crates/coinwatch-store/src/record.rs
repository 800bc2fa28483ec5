//! Rows returned by the partitioned store.

use crate::codec::{CodecError, StoreValue};
use crate::key::CompositeKey;
use chrono::NaiveDateTime;

/// Value state of a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValue {
    /// Payload fetched together with the key.
    Loaded(Vec<u8>),
    /// Payload not fetched yet, materialized by
    /// [`PartitionedStore::load_value`](crate::PartitionedStore::load_value).
    Pending,
}

/// A logical row of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    key: CompositeKey,
    value: RecordValue,
    deleted_at: Option<NaiveDateTime>,
}

impl Record {
    pub(crate) fn new(key: CompositeKey, value: RecordValue) -> Self {
        Self {
            key,
            value,
            deleted_at: None,
        }
    }

    pub(crate) fn with_deleted_at(mut self, deleted_at: Option<NaiveDateTime>) -> Self {
        self.deleted_at = deleted_at;
        self
    }

    pub fn key(&self) -> &CompositeKey {
        &self.key
    }

    pub fn partition_key(&self) -> &str {
        self.key.partition()
    }

    pub fn row_key(&self) -> &str {
        self.key.row()
    }

    /// Soft-delete timestamp, always `None` for rows returned by live reads.
    pub fn deleted_at(&self) -> Option<NaiveDateTime> {
        self.deleted_at
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.value, RecordValue::Loaded(_))
    }

    /// Payload if already materialized.
    pub fn value(&self) -> Option<&[u8]> {
        match &self.value {
            RecordValue::Loaded(bytes) => Some(bytes),
            RecordValue::Pending => None,
        }
    }

    /// Decodes the payload if already materialized.
    pub fn decode<T: StoreValue>(&self) -> Option<Result<T, CodecError>> {
        self.value().map(T::decode)
    }

    pub(crate) fn set_loaded(&mut self, bytes: Vec<u8>) -> &[u8] {
        self.value = RecordValue::Loaded(bytes);
        match &self.value {
            RecordValue::Loaded(bytes) => bytes,
            RecordValue::Pending => unreachable!("value was just loaded; qed"),
        }
    }
}
