use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use sstore_common::{Error, Result};
use tracing::{debug, info};
use url::form_urlencoded;

use crate::migrations::SchemaVersion;

pub const DEFAULT_MIGRATIONS_TABLE: &str = "schema_migrations";

/// Stored in the version column when a dirty step targets "no version".
const NIL_VERSION: i64 = -1;

static TABLE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("table name pattern is valid")
});

/// Options taken from the query string of a `sqlite3://` URL.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// `x-migrations-table`
    pub migrations_table: String,
    /// `x-no-tx-wrap`: run migration bodies without an enclosing transaction.
    pub no_tx_wrap: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            no_tx_wrap: false,
        }
    }
}

/// SQLite backend: runs migration bodies and keeps the single
/// `(version, dirty)` row.
pub struct SqliteDriver {
    conn: Connection,
    options: DriverOptions,
}

impl SqliteDriver {
    /// Open from `sqlite3://<path>[?x-migrations-table=..&x-no-tx-wrap=true]`,
    /// where `<path>` is percent-encoded. `sqlite://` is accepted too.
    pub fn from_url(database_url: &str) -> Result<Self> {
        let rest = database_url
            .strip_prefix("sqlite3://")
            .or_else(|| database_url.strip_prefix("sqlite://"))
            .ok_or_else(|| {
                Error::Database(format!("unsupported database url: {database_url}"))
            })?;
        // the path is percent-encoded, so the first `?` starts the query
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        if path.is_empty() {
            return Err(Error::Database(format!(
                "database url has no path: {database_url}"
            )));
        }
        let path = urlencoding::decode(path).map_err(|e| {
            Error::Database(format!("invalid database path in {database_url}: {e}"))
        })?;

        let mut options = DriverOptions::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "x-migrations-table" => options.migrations_table = value.into_owned(),
                "x-no-tx-wrap" => {
                    options.no_tx_wrap = value.parse::<bool>().map_err(|_| {
                        Error::Database(format!("invalid x-no-tx-wrap value: {value}"))
                    })?;
                }
                other => debug!("ignoring database url parameter {other}"),
            }
        }

        Self::open_with(Path::new(path.as_ref()), options)
    }

    pub fn open(db_path: &Path) -> Result<Self> {
        Self::open_with(db_path, DriverOptions::default())
    }

    pub fn open_with(db_path: &Path, options: DriverOptions) -> Result<Self> {
        info!("opening session database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Self::with_connection(conn, options)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Self::with_connection(conn, DriverOptions::default())
    }

    /// Wrap an already open connection, creating the version table if needed.
    pub fn with_connection(conn: Connection, options: DriverOptions) -> Result<Self> {
        if !TABLE_NAME_RE.is_match(&options.migrations_table) {
            return Err(Error::Database(format!(
                "invalid migrations table name: {}",
                options.migrations_table
            )));
        }

        let driver = Self { conn, options };
        driver.ensure_version_table()?;
        Ok(driver)
    }

    pub fn migrations_table(&self) -> &str {
        &self.options.migrations_table
    }

    /// Direct access to the underlying connection, mainly for inspection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn ensure_version_table(&self) -> Result<()> {
        let table = &self.options.migrations_table;
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (version INTEGER, dirty BOOLEAN);
                 CREATE UNIQUE INDEX IF NOT EXISTS {table}_version_unique ON {table} (version);"
            ))
            .map_err(|e| Error::Database(format!("failed to create version table: {e}")))?;
        Ok(())
    }

    /// Current recorded version. No row means nothing has been applied.
    pub fn version(&self) -> Result<SchemaVersion> {
        let row: Option<(i64, bool)> = self
            .conn
            .query_row(
                &format!(
                    "SELECT version, dirty FROM {} LIMIT 1",
                    self.options.migrations_table
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to read schema version: {e}")))?;

        Ok(match row {
            Some((version, dirty)) => SchemaVersion {
                version: u64::try_from(version).ok(),
                dirty,
            },
            None => SchemaVersion::default(),
        })
    }

    /// Replace the version row. A clean nil version leaves the table empty.
    pub fn set_version(&mut self, version: Option<u64>, dirty: bool) -> Result<()> {
        let stored = match version {
            Some(v) => i64::try_from(v)
                .map_err(|_| Error::Database(format!("version {v} out of range")))?,
            None => NIL_VERSION,
        };
        let table = self.options.migrations_table.clone();

        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to start transaction: {e}")))?;
        tx.execute(&format!("DELETE FROM {table}"), [])
            .map_err(|e| Error::Database(format!("failed to clear schema version: {e}")))?;
        if version.is_some() || dirty {
            tx.execute(
                &format!("INSERT INTO {table} (version, dirty) VALUES (?1, ?2)"),
                params![stored, dirty],
            )
            .map_err(|e| Error::Database(format!("failed to record schema version: {e}")))?;
        }
        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit schema version: {e}")))?;
        Ok(())
    }

    /// Execute a migration body, wrapped in a transaction unless
    /// `no_tx_wrap` is set.
    pub fn run(&mut self, body: &str) -> Result<()> {
        if self.options.no_tx_wrap {
            return self
                .conn
                .execute_batch(body)
                .map_err(|e| Error::Database(e.to_string()));
        }

        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to start transaction: {e}")))?;
        tx.execute_batch(body)
            .map_err(|e| Error::Database(e.to_string()))?;
        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit migration: {e}")))?;
        Ok(())
    }
}
