use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use sstore_common::error::display_version;

/// Which half of a migration a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single migration file on disk, e.g. `0003_add_history.up.sql`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: u64,
    pub identifier: String,
    pub direction: Direction,
    pub path: PathBuf,
}

/// The version row recorded in the database.
///
/// `version` is `None` when no migration has been applied. `dirty` is set
/// while a step is running and stays set if that step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SchemaVersion {
    pub version: Option<u64>,
    pub dirty: bool,
}

impl SchemaVersion {
    pub fn clean(version: u64) -> Self {
        Self {
            version: Some(version),
            dirty: false,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "version={}", display_version(&self.version))?;
        if self.dirty {
            f.write_str(" (dirty)")?;
        }
        Ok(())
    }
}
