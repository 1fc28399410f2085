use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sstore_common::{Error, Result};
use url::{Url, form_urlencoded};

pub const DEFAULT_DB_NAME: &str = "session.db";
pub const DEFAULT_MIGRATIONS_DIR: &str = "db/migrations";
pub const DEFAULT_MIGRATIONS_TABLE: &str = "schema_migrations";

/// Contents of `config.yml` / `config.toml` in the sstore home directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SstoreConfig {
    /// Session database file name, relative to the home directory.
    pub db_name: String,
    /// Relative paths are resolved against the working directory.
    pub migrations_dir: PathBuf,
    pub migrations_table: String,
    /// Run migration bodies without wrapping them in a transaction.
    pub no_tx_wrap: bool,
}

impl Default for SstoreConfig {
    fn default() -> Self {
        Self {
            db_name: DEFAULT_DB_NAME.to_string(),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            no_tx_wrap: false,
        }
    }
}

/// Absolute locations the migration engine is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub home_dir: PathBuf,
    pub db_path: PathBuf,
    pub migrations_dir: PathBuf,
    pub migrations_table: String,
    pub no_tx_wrap: bool,
}

impl ResolvedPaths {
    pub fn resolve(config: &SstoreConfig, home_dir: &Path, cwd: &Path) -> Self {
        let home_dir = if home_dir.is_absolute() {
            home_dir.to_path_buf()
        } else {
            cwd.join(home_dir)
        };
        let migrations_dir = if config.migrations_dir.is_absolute() {
            config.migrations_dir.clone()
        } else {
            cwd.join(&config.migrations_dir)
        };

        Self {
            db_path: home_dir.join(&config.db_name),
            home_dir,
            migrations_dir,
            migrations_table: config.migrations_table.clone(),
            no_tx_wrap: config.no_tx_wrap,
        }
    }

    /// `file://` URL of the migrations directory.
    pub fn source_url(&self) -> Result<String> {
        Url::from_directory_path(&self.migrations_dir)
            .map(String::from)
            .map_err(|_| {
                Error::Config(format!(
                    "migrations directory must be absolute: {}",
                    self.migrations_dir.display()
                ))
            })
    }

    /// `sqlite3://` URL of the session database. The path is
    /// percent-encoded so `?`, `#` and `%` in it survive the round trip.
    /// Non-default options are carried as query parameters.
    pub fn database_url(&self) -> Result<String> {
        let file_url = Url::from_file_path(&self.db_path).map_err(|_| {
            Error::Config(format!(
                "database path must be absolute: {}",
                self.db_path.display()
            ))
        })?;

        let mut query = form_urlencoded::Serializer::new(String::new());
        if self.migrations_table != DEFAULT_MIGRATIONS_TABLE {
            query.append_pair("x-migrations-table", &self.migrations_table);
        }
        if self.no_tx_wrap {
            query.append_pair("x-no-tx-wrap", "true");
        }
        let query = query.finish();

        let base = format!("sqlite3://{}", file_url.path());
        if query.is_empty() {
            Ok(base)
        } else {
            Ok(format!("{base}?{query}"))
        }
    }
}
