//! Database and table bootstrap.

use crate::backend::Connection;
use crate::config::ConnectOptions;
use crate::error::{Error, Result, sql_state};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection as _, Executor as _};

/// `invalid_catalog_name`: the target database does not exist.
const UNDEFINED_DATABASE: &str = "3D000";

/// `duplicate_database`: someone else created it first.
const DUPLICATE_DATABASE: &str = "42P04";

/// Database the server always has, used to create the target database.
const MAINTENANCE_DATABASE: &str = "postgres";

/// Opens a connection, creating the PostgreSQL database first if it does not exist.
pub(crate) async fn open_or_create(options: &ConnectOptions) -> Result<Connection> {
    match Connection::open(options).await {
        Ok(connection) => Ok(connection),
        Err(err) if sql_state(&err).as_deref() == Some(UNDEFINED_DATABASE) => {
            let ConnectOptions::Postgres(pg_options) = options else {
                return Err(Error::Backend(err));
            };
            create_database(pg_options).await?;
            Connection::open(options).await.map_err(Error::Backend)
        }
        Err(err) => Err(Error::Backend(err)),
    }
}

/// Creates the backing table if it is absent.
pub(crate) async fn create_table(connection: &mut Connection) -> Result<()> {
    let ddl = connection.dialect().create_table();
    connection
        .execute_raw(&ddl)
        .await
        .map_err(Error::SchemaBootstrap)?;
    tracing::debug!(dialect = ?connection.dialect(), "Partitioned store schema ready");
    Ok(())
}

async fn create_database(options: &PgConnectOptions) -> Result<()> {
    let database = options
        .get_database()
        .ok_or_else(|| Error::Config("PostgreSQL connection string names no database".into()))?
        .to_string();

    let maintenance = options.clone().database(MAINTENANCE_DATABASE);
    let mut connection = PgConnection::connect_with(&maintenance)
        .await
        .map_err(Error::SchemaBootstrap)?;

    match connection.execute(create_database_sql(&database).as_str()).await {
        Ok(_) => tracing::info!(%database, "Created database with byte-wise collation"),
        Err(err) if sql_state(&err).as_deref() == Some(DUPLICATE_DATABASE) => {
            tracing::debug!(%database, "Database created concurrently");
        }
        Err(err) => return Err(Error::SchemaBootstrap(err)),
    }

    connection.close().await.map_err(Error::SchemaBootstrap)
}

/// `LC_COLLATE`/`LC_CTYPE` of `C` give byte-wise ordering and let `LIKE 'prefix%'`
/// use the primary key index.
fn create_database_sql(database: &str) -> String {
    let quoted = database.replace('"', "\"\"");
    format!(
        "CREATE DATABASE \"{quoted}\" \
         LC_COLLATE = 'C' \
         TEMPLATE = template0 \
         LC_CTYPE = 'C' \
         ENCODING = 'UTF8'"
    )
}
