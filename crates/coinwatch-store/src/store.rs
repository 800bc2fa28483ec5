//! Partitioned key-value store on top of a relational table.

use crate::backend::{Connection, PendingWrite, Statement};
use crate::codec::{StoreValue, Value, ValueKind};
use crate::config::{ConnectOptions, StoreConfig};
use crate::error::{Error, Result};
use crate::key::{self, CompositeKey};
use crate::record::{Record, RecordValue};
use crate::schema;

/// Backend call counters of a store instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Key lookups, scans and counts.
    pub queries: u64,
    /// Deferred value fetches of lazily loaded records.
    pub value_fetches: u64,
    /// Non-empty commits sent to the backend.
    pub commits: u64,
}

/// Partitioned, ordered key-value store emulated on a single SQL table.
///
/// Every row is addressed by a partition key and a row key. Reads only see
/// live rows and writes are staged locally until [`commit`](Self::commit),
/// which applies them atomically in staging order.
///
/// An instance owns one backend connection, opened on first use. It is not
/// meant to be shared between tasks without external synchronization.
/// Concurrent writers on different instances resolve conflicts on the same
/// key by last commit wins.
pub struct PartitionedStore {
    options: ConnectOptions,
    connection: Option<Connection>,
    lazy_loading: bool,
    hard_delete: bool,
    pending: Vec<PendingWrite>,
    stats: StoreStats,
}

impl PartitionedStore {
    /// Creates a store without touching the backend.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        Ok(Self {
            options: config.connect_options()?,
            connection: None,
            lazy_loading: config.lazy_loading,
            hard_delete: config.hard_delete,
            pending: Vec::new(),
            stats: StoreStats::default(),
        })
    }

    /// Creates a store and makes sure its schema exists.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let mut store = Self::new(config)?;
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn lazy_loading(&self) -> bool {
        self.lazy_loading
    }

    pub fn set_lazy_loading(&mut self, lazy_loading: bool) {
        self.lazy_loading = lazy_loading;
    }

    pub fn hard_delete(&self) -> bool {
        self.hard_delete
    }

    /// Switches between physical and soft deletion for writes staged from now on.
    pub fn set_hard_delete(&mut self, hard_delete: bool) {
        self.hard_delete = hard_delete;
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Writes staged since the last commit, in staging order.
    pub fn pending(&self) -> &[PendingWrite] {
        &self.pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    async fn connection(&mut self) -> Result<&mut Connection> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => Connection::open(&self.options).await?,
        };
        Ok(self.connection.insert(connection))
    }

    /// Creates the backing table, and on PostgreSQL the database itself, if
    /// they do not exist yet.
    ///
    /// Safe to call on every start.
    pub async fn ensure_schema(&mut self) -> Result<()> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => schema::open_or_create(&self.options).await?,
        };
        schema::create_table(self.connection.insert(connection)).await
    }

    /// Returns the live row at `(partition, row)`.
    pub async fn get(&mut self, partition: &str, row: &str) -> Result<Option<Record>> {
        let key = CompositeKey::new(partition, row)?;
        let lazy = self.lazy_loading;
        self.stats.queries += 1;

        let connection = self.connection().await?;
        let sql = connection.dialect().select_live(!lazy);
        let record = if lazy {
            connection
                .fetch_keys(&sql, key.as_str())
                .await?
                .into_iter()
                .next()
                .map(|_| Record::new(key, RecordValue::Pending))
        } else {
            connection
                .fetch_rows(&sql, key.as_str())
                .await?
                .into_iter()
                .next()
                .map(|(_, value)| Record::new(key, RecordValue::Loaded(value.unwrap_or_default())))
        };

        Ok(record)
    }

    /// Returns the row at `(partition, row)` whether or not it is soft-deleted.
    ///
    /// The value is always loaded.
    pub async fn get_with_deleted(&mut self, partition: &str, row: &str) -> Result<Option<Record>> {
        let key = CompositeKey::new(partition, row)?;
        self.stats.queries += 1;

        let row = self.connection().await?.fetch_with_deleted(key.as_str()).await?;
        Ok(row.map(|(_, value, deleted_at)| {
            Record::new(key, RecordValue::Loaded(value.unwrap_or_default()))
                .with_deleted_at(deleted_at)
        }))
    }

    /// Reads and decodes the live value at `(partition, row)`.
    pub async fn get_value<T: StoreValue>(&mut self, partition: &str, row: &str) -> Result<Option<T>> {
        match self.get(partition, row).await? {
            Some(mut record) => self.load(&mut record).await.map(Some),
            None => Ok(None),
        }
    }

    /// Returns the live rows of `partition` whose row key starts with
    /// `row_prefix`, ordered by key bytes.
    pub async fn scan_prefix(&mut self, partition: &str, row_prefix: &str) -> Result<Vec<Record>> {
        let prefix = key::prefix(partition, row_prefix)?;
        let lazy = self.lazy_loading;
        self.stats.queries += 1;

        let connection = self.connection().await?;
        let dialect = connection.dialect();
        let sql = dialect.scan_live(!lazy);
        let pattern = dialect.prefix_pattern(&prefix);

        let records = if lazy {
            connection
                .fetch_keys(&sql, &pattern)
                .await?
                .into_iter()
                .map(|encoded| -> Result<Record> {
                    Ok(Record::new(CompositeKey::parse(&encoded)?, RecordValue::Pending))
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            connection
                .fetch_rows(&sql, &pattern)
                .await?
                .into_iter()
                .map(|(encoded, value)| -> Result<Record> {
                    Ok(Record::new(
                        CompositeKey::parse(&encoded)?,
                        RecordValue::Loaded(value.unwrap_or_default()),
                    ))
                })
                .collect::<Result<Vec<_>>>()?
        };

        tracing::trace!(partition, row_prefix, rows = records.len(), lazy, "Scanned partition");

        Ok(records)
    }

    /// Number of live rows [`scan_prefix`](Self::scan_prefix) would return.
    pub async fn count(&mut self, partition: &str, row_prefix: &str) -> Result<u64> {
        let prefix = key::prefix(partition, row_prefix)?;
        self.stats.queries += 1;

        let connection = self.connection().await?;
        let dialect = connection.dialect();
        let count = connection
            .fetch_count(&dialect.count_live(), &dialect.prefix_pattern(&prefix))
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Returns the value of `record`, fetching it on first access.
    ///
    /// A pending value is fetched exactly once, later calls return the
    /// memoized payload. A row removed in the meantime yields an empty payload.
    pub async fn load_value<'r>(&mut self, record: &'r mut Record) -> Result<&'r [u8]> {
        if record.is_loaded() {
            return Ok(record.value().unwrap_or_default());
        }

        self.stats.value_fetches += 1;
        let value = self
            .connection()
            .await?
            .fetch_value(record.key().as_str())
            .await?
            .flatten()
            .unwrap_or_default();
        Ok(record.set_loaded(value))
    }

    /// Materializes and decodes the value of `record`.
    pub async fn load<T: StoreValue>(&mut self, record: &mut Record) -> Result<T> {
        let bytes = self.load_value(record).await?;
        T::decode(bytes).map_err(Error::from)
    }

    /// Materializes the value of `record` and decodes it as `kind`.
    pub async fn load_as(&mut self, record: &mut Record, kind: ValueKind) -> Result<Value> {
        let bytes = self.load_value(record).await?;
        Value::decode(kind, bytes).map_err(Error::from)
    }

    /// Stages an insert or overwrite of `(partition, row)`.
    ///
    /// Unless in hard-delete mode, a soft-deleted row is brought back to life.
    pub fn upsert(&mut self, partition: &str, row: &str, value: Vec<u8>) -> Result<()> {
        let key = CompositeKey::new(partition, row)?;
        self.pending.push(PendingWrite::Upsert {
            key,
            value,
            resurrect: !self.hard_delete,
        });
        Ok(())
    }

    /// Encodes `value` and stages it like [`upsert`](Self::upsert).
    pub fn upsert_value<T: StoreValue>(&mut self, partition: &str, row: &str, value: &T) -> Result<()> {
        self.upsert(partition, row, value.encode())
    }

    /// Stages the removal of `(partition, row)`.
    pub fn remove(&mut self, partition: &str, row: &str) -> Result<()> {
        let key = CompositeKey::new(partition, row)?;
        self.pending.push(if self.hard_delete {
            PendingWrite::HardDelete { key }
        } else {
            PendingWrite::SoftDelete { key }
        });
        Ok(())
    }

    /// Applies every staged write in a single backend transaction.
    ///
    /// Returns the number of affected rows. The staged writes are dropped
    /// whether the commit succeeds or not.
    ///
    /// Each write is sent as its own parameterized statement between `BEGIN`
    /// and `COMMIT`, so a batch of N writes costs N + 2 round trips. A failing
    /// statement rolls back the writes before it.
    pub async fn commit(&mut self) -> Result<u64> {
        let batch = std::mem::take(&mut self.pending);
        if batch.is_empty() {
            return Ok(0);
        }

        let statements = batch.iter().map(PendingWrite::statement).collect::<Vec<Statement>>();
        self.stats.commits += 1;

        let affected = self.connection().await?.execute_batch(&statements).await?;
        tracing::debug!(writes = statements.len(), affected, "Committed staged writes");

        Ok(affected)
    }
}

impl std::fmt::Debug for PartitionedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedStore")
            .field("connected", &self.is_connected())
            .field("lazy_loading", &self.lazy_loading)
            .field("hard_delete", &self.hard_delete)
            .field("pending", &self.pending.len())
            .field("stats", &self.stats)
            .finish()
    }
}
