//! Backend connections and SQL.
//!
//! Both supported backends accept `$N` placeholders, so statements are shared
//! and only the prefix predicate and the table definition differ per dialect.

use crate::config::ConnectOptions;
use crate::key::CompositeKey;
use chrono::NaiveDateTime;
use sqlx::postgres::PgConnection;
use sqlx::sqlite::SqliteConnection;
use sqlx::{Connection as _, Executor as _};

/// Name of the backing table.
pub const TABLE: &str = "generic_tables";

/// Runs `$body` against whichever concrete connection is open.
macro_rules! with_connection {
    ($conn:expr, $c:ident => $body:expr) => {
        match $conn {
            Connection::Postgres($c) => $body,
            Connection::Sqlite($c) => $body,
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Table definition with byte-wise comparison of the primary key.
    pub(crate) fn create_table(&self) -> String {
        let (collation, blob) = match self {
            Self::Postgres => ("COLLATE \"C\"", "BYTEA"),
            Self::Sqlite => ("COLLATE BINARY", "BLOB"),
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} (\
             composite_key TEXT {collation} NOT NULL PRIMARY KEY, \
             value {blob}, \
             deleted_at TIMESTAMP)"
        )
    }

    /// Predicate matching `composite_key` against the pattern bound to `$1`.
    fn prefix_predicate(&self) -> &'static str {
        match self {
            Self::Postgres => r"composite_key LIKE $1 ESCAPE '\'",
            Self::Sqlite => "composite_key GLOB $1",
        }
    }

    /// Pattern for [`Self::prefix_predicate`] that matches `prefix` literally.
    pub(crate) fn prefix_pattern(&self, prefix: &str) -> String {
        let mut pattern = String::with_capacity(prefix.len() + 4);
        match self {
            Self::Postgres => {
                for c in prefix.chars() {
                    if matches!(c, '\\' | '%' | '_') {
                        pattern.push('\\');
                    }
                    pattern.push(c);
                }
                pattern.push('%');
            }
            Self::Sqlite => {
                for c in prefix.chars() {
                    match c {
                        '*' | '?' | '[' => {
                            pattern.push('[');
                            pattern.push(c);
                            pattern.push(']');
                        }
                        _ => pattern.push(c),
                    }
                }
                pattern.push('*');
            }
        }
        pattern
    }

    pub(crate) fn select_live(&self, with_value: bool) -> String {
        format!(
            "SELECT {} FROM {TABLE} WHERE composite_key = $1 AND deleted_at IS NULL LIMIT 1",
            columns(with_value)
        )
    }

    pub(crate) fn scan_live(&self, with_value: bool) -> String {
        format!(
            "SELECT {} FROM {TABLE} WHERE {} AND deleted_at IS NULL ORDER BY composite_key",
            columns(with_value),
            self.prefix_predicate()
        )
    }

    pub(crate) fn count_live(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM {TABLE} WHERE {} AND deleted_at IS NULL",
            self.prefix_predicate()
        )
    }
}

fn columns(with_value: bool) -> &'static str {
    if with_value {
        "composite_key, value"
    } else {
        "composite_key"
    }
}

pub(crate) const SELECT_VALUE: &str = "SELECT value FROM generic_tables WHERE composite_key = $1";

pub(crate) const SELECT_WITH_DELETED: &str =
    "SELECT composite_key, value, deleted_at FROM generic_tables WHERE composite_key = $1";

const UPSERT_RESURRECT: &str = "INSERT INTO generic_tables (composite_key, value) VALUES ($1, $2) \
     ON CONFLICT (composite_key) DO UPDATE SET value = excluded.value, deleted_at = NULL";

const UPSERT_KEEP_DELETED: &str = "INSERT INTO generic_tables (composite_key, value) VALUES ($1, $2) \
     ON CONFLICT (composite_key) DO UPDATE SET value = excluded.value";

const SOFT_DELETE: &str = "UPDATE generic_tables SET deleted_at = CURRENT_TIMESTAMP \
     WHERE composite_key = $1 AND deleted_at IS NULL";

const HARD_DELETE: &str = "DELETE FROM generic_tables WHERE composite_key = $1";

/// A write staged in a [`PartitionedStore`](crate::PartitionedStore).
///
/// The delete mode is captured when the write is staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    Upsert {
        key: CompositeKey,
        value: Vec<u8>,
        resurrect: bool,
    },
    SoftDelete {
        key: CompositeKey,
    },
    HardDelete {
        key: CompositeKey,
    },
}

impl PendingWrite {
    pub fn key(&self) -> &CompositeKey {
        match self {
            Self::Upsert { key, .. } | Self::SoftDelete { key } | Self::HardDelete { key } => key,
        }
    }

    /// Builds the statement applying this write, with its own parameters.
    pub(crate) fn statement(&self) -> Statement {
        match self {
            Self::Upsert {
                key,
                value,
                resurrect,
            } => Statement {
                sql: if *resurrect {
                    UPSERT_RESURRECT
                } else {
                    UPSERT_KEEP_DELETED
                },
                params: vec![Param::Text(key.to_string()), Param::Bytes(value.clone())],
            },
            Self::SoftDelete { key } => Statement {
                sql: SOFT_DELETE,
                params: vec![Param::Text(key.to_string())],
            },
            Self::HardDelete { key } => Statement {
                sql: HARD_DELETE,
                params: vec![Param::Text(key.to_string())],
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Param {
    Text(String),
    Bytes(Vec<u8>),
}

/// SQL text together with its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Statement {
    pub(crate) sql: &'static str,
    pub(crate) params: Vec<Param>,
}

/// A single open backend connection.
pub(crate) enum Connection {
    Postgres(PgConnection),
    Sqlite(SqliteConnection),
}

impl Connection {
    pub(crate) async fn open(options: &ConnectOptions) -> sqlx::Result<Self> {
        match options {
            ConnectOptions::Postgres(options) => {
                PgConnection::connect_with(options).await.map(Self::Postgres)
            }
            ConnectOptions::Sqlite(options) => SqliteConnection::connect_with(options)
                .await
                .map(Self::Sqlite),
        }
    }

    pub(crate) fn dialect(&self) -> Dialect {
        match self {
            Self::Postgres(_) => Dialect::Postgres,
            Self::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Executes a parameterless statement such as DDL.
    pub(crate) async fn execute_raw(&mut self, sql: &str) -> sqlx::Result<()> {
        with_connection!(self, c => c.execute(sql).await.map(|_| ()))
    }

    pub(crate) async fn fetch_rows(
        &mut self,
        sql: &str,
        param: &str,
    ) -> sqlx::Result<Vec<(String, Option<Vec<u8>>)>> {
        with_connection!(self, c => sqlx::query_as(sql).bind(param).fetch_all(c).await)
    }

    pub(crate) async fn fetch_keys(&mut self, sql: &str, param: &str) -> sqlx::Result<Vec<String>> {
        with_connection!(self, c => sqlx::query_scalar(sql).bind(param).fetch_all(c).await)
    }

    pub(crate) async fn fetch_count(&mut self, sql: &str, param: &str) -> sqlx::Result<i64> {
        with_connection!(self, c => sqlx::query_scalar(sql).bind(param).fetch_one(c).await)
    }

    /// Value column of one row, `None` if the row does not exist.
    pub(crate) async fn fetch_value(&mut self, key: &str) -> sqlx::Result<Option<Option<Vec<u8>>>> {
        with_connection!(self, c => sqlx::query_scalar(SELECT_VALUE).bind(key).fetch_optional(c).await)
    }

    pub(crate) async fn fetch_with_deleted(
        &mut self,
        key: &str,
    ) -> sqlx::Result<Option<(String, Option<Vec<u8>>, Option<NaiveDateTime>)>> {
        with_connection!(self, c => sqlx::query_as(SELECT_WITH_DELETED).bind(key).fetch_optional(c).await)
    }

    /// Applies `statements` in order inside one transaction, returning the
    /// total number of affected rows.
    ///
    /// Any failure rolls back the whole batch.
    pub(crate) async fn execute_batch(&mut self, statements: &[Statement]) -> sqlx::Result<u64> {
        let affected = with_connection!(self, c => {
            let mut tx = c.begin().await?;
            let mut affected = 0u64;
            for (seq, statement) in statements.iter().enumerate() {
                let mut query = sqlx::query(statement.sql);
                for param in &statement.params {
                    query = match param {
                        Param::Text(text) => query.bind(text.as_str()),
                        Param::Bytes(bytes) => query.bind(bytes.as_slice()),
                    };
                }
                let rows = query.execute(&mut *tx).await?.rows_affected();
                tracing::trace!(seq, rows, sql = statement.sql, "Applied staged write");
                affected += rows;
            }
            tx.commit().await?;
            affected
        });
        Ok(affected)
    }
}
