use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("migration source error: {0}")]
    Source(String),

    #[error("migration error: {0}")]
    Migration(String),

    /// The requested operation had nothing to apply.
    #[error("no change")]
    NoChange,

    /// A previous step started but never finished.
    #[error("database is dirty, version={}", display_version(.version))]
    Dirty { version: Option<u64> },

    /// `steps(n)` ran out of migrations before `n` were applied.
    #[error("limit {0} short")]
    ShortLimit(u64),

    #[error("invalid migration command: {0}")]
    InvalidCommand(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this is the "nothing to do" outcome callers treat as success.
    pub fn is_no_change(&self) -> bool {
        matches!(self, Error::NoChange)
    }
}

/// Render an optional schema version, `none` when nothing is applied.
pub fn display_version(version: &Option<u64>) -> String {
    match version {
        Some(v) => v.to_string(),
        None => "none".to_string(),
    }
}
