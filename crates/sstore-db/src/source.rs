use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use sstore_common::{Error, Result};
use tracing::{debug, warn};
use url::Url;

use crate::migrations::{Direction, MigrationFile};

/// `{version}_{identifier}.{up|down}.{ext}`
static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)_(.*)\.(down|up)\.(.*)$").expect("migration filename pattern is valid")
});

#[derive(Debug, Default, Clone)]
struct VersionFiles {
    up: Option<MigrationFile>,
    down: Option<MigrationFile>,
}

/// Migration files read from one directory, ordered by version.
#[derive(Debug, Clone)]
pub struct MigrationSource {
    dir: PathBuf,
    migrations: BTreeMap<u64, VersionFiles>,
}

impl MigrationSource {
    /// Open a source from a `file://` URL. A URL with a host part
    /// (`file://db/migrations`) is read as a relative path.
    pub fn from_url(source_url: &str) -> Result<Self> {
        let url = Url::parse(source_url)
            .map_err(|e| Error::Source(format!("invalid source url {source_url}: {e}")))?;
        if url.scheme() != "file" {
            return Err(Error::Source(format!(
                "unsupported source scheme: {}",
                url.scheme()
            )));
        }

        let dir = match url.host_str() {
            Some(host) if !host.is_empty() => PathBuf::from(format!("{host}{}", url.path())),
            _ => url
                .to_file_path()
                .map_err(|_| Error::Source(format!("invalid file path in {source_url}")))?,
        };
        Self::open(&dir)
    }

    /// Scan `dir` for migration files. Entries that don't match the naming
    /// pattern are skipped.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::Source(format!(
                "migrations directory not found: {}",
                dir.display()
            )));
        }

        let mut migrations: BTreeMap<u64, VersionFiles> = BTreeMap::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                warn!("skipping non-utf8 file name in {}", dir.display());
                continue;
            };
            let Some(file) = parse_file_name(name, entry.path())? else {
                debug!("ignoring {name}: not a migration file");
                continue;
            };

            let slot = migrations.entry(file.version).or_default();
            let existing = match file.direction {
                Direction::Up => &mut slot.up,
                Direction::Down => &mut slot.down,
            };
            if let Some(prev) = existing {
                return Err(Error::Source(format!(
                    "duplicate migration file: {} and {}",
                    prev.path.display(),
                    file.path.display()
                )));
            }
            *existing = Some(file);
        }

        debug!(
            "loaded {} migration versions from {}",
            migrations.len(),
            dir.display()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            migrations,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn contains(&self, version: u64) -> bool {
        self.migrations.contains_key(&version)
    }

    pub fn first(&self) -> Option<u64> {
        self.migrations.keys().next().copied()
    }

    pub fn next(&self, version: u64) -> Option<u64> {
        self.migrations
            .range((Bound::Excluded(version), Bound::Unbounded))
            .next()
            .map(|(v, _)| *v)
    }

    pub fn prev(&self, version: u64) -> Option<u64> {
        self.migrations
            .range(..version)
            .next_back()
            .map(|(v, _)| *v)
    }

    pub fn file(&self, version: u64, direction: Direction) -> Option<&MigrationFile> {
        let files = self.migrations.get(&version)?;
        match direction {
            Direction::Up => files.up.as_ref(),
            Direction::Down => files.down.as_ref(),
        }
    }

    pub fn read_up(&self, version: u64) -> Result<Option<String>> {
        self.read(version, Direction::Up)
    }

    pub fn read_down(&self, version: u64) -> Result<Option<String>> {
        self.read(version, Direction::Down)
    }

    /// Body of the file for `version` in `direction`, `None` if that half
    /// of the migration doesn't exist.
    pub fn read(&self, version: u64, direction: Direction) -> Result<Option<String>> {
        let Some(file) = self.file(version, direction) else {
            return Ok(None);
        };
        let body = std::fs::read_to_string(&file.path).map_err(|e| {
            Error::Source(format!("failed to read {}: {e}", file.path.display()))
        })?;
        Ok(Some(body))
    }
}

fn parse_file_name(name: &str, path: PathBuf) -> Result<Option<MigrationFile>> {
    let Some(caps) = FILENAME_RE.captures(name) else {
        return Ok(None);
    };

    let version = caps[1]
        .parse::<u64>()
        .map_err(|e| Error::Source(format!("invalid version in {name}: {e}")))?;
    // Versions are stored as SQLite INTEGER.
    if version > i64::MAX as u64 {
        return Err(Error::Source(format!("version out of range in {name}")));
    }
    let direction = match &caps[3] {
        "up" => Direction::Up,
        _ => Direction::Down,
    };

    Ok(Some(MigrationFile {
        version,
        identifier: caps[2].to_string(),
        direction,
        path,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    fn sample_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "1_init.up.sql", "CREATE TABLE a (id INTEGER);");
        write(dir.path(), "1_init.down.sql", "DROP TABLE a;");
        write(dir.path(), "3_more.up.sql", "CREATE TABLE c (id INTEGER);");
        write(dir.path(), "10_last.up.sql", "CREATE TABLE j (id INTEGER);");
        write(dir.path(), "10_last.down.sql", "DROP TABLE j;");
        write(dir.path(), "README.md", "not a migration");
        dir
    }

    #[test]
    fn parses_migration_file_names() {
        let file = parse_file_name("0002_add_users.up.sql", PathBuf::from("x"))
            .unwrap()
            .unwrap();
        assert_eq!(file.version, 2);
        assert_eq!(file.identifier, "add_users");
        assert_eq!(file.direction, Direction::Up);

        let file = parse_file_name("5_drop.down.sql", PathBuf::from("x"))
            .unwrap()
            .unwrap();
        assert_eq!(file.direction, Direction::Down);

        assert!(parse_file_name("init.up.sql", PathBuf::from("x"))
            .unwrap()
            .is_none());
        assert!(parse_file_name("1_init.sideways.sql", PathBuf::from("x"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn rejects_version_beyond_sqlite_integer() {
        let name = format!("{}_huge.up.sql", u64::MAX);
        assert!(parse_file_name(&name, PathBuf::from("x")).is_err());
    }

    #[test]
    fn orders_versions_numerically() {
        let dir = sample_dir();
        let source = MigrationSource::open(dir.path()).unwrap();

        let walked: Vec<u64> =
            std::iter::successors(source.first(), |v| source.next(*v)).collect();
        assert_eq!(walked, vec![1, 3, 10]);
        assert_eq!(source.first(), Some(1));
        assert_eq!(source.next(1), Some(3));
        assert_eq!(source.next(3), Some(10));
        assert_eq!(source.next(10), None);
        assert_eq!(source.prev(10), Some(3));
        assert_eq!(source.prev(1), None);
        assert!(source.contains(3));
        assert!(!source.contains(2));
    }

    #[test]
    fn reads_bodies_and_missing_halves() {
        let dir = sample_dir();
        let source = MigrationSource::open(dir.path()).unwrap();

        assert_eq!(
            source.read_up(1).unwrap().as_deref(),
            Some("CREATE TABLE a (id INTEGER);")
        );
        assert_eq!(source.read_down(1).unwrap().as_deref(), Some("DROP TABLE a;"));
        assert!(source.read_down(3).unwrap().is_none());
        assert!(source.read_up(99).unwrap().is_none());
    }

    #[test]
    fn duplicate_version_is_an_error() {
        let dir = sample_dir();
        write(dir.path(), "01_again.up.sql", "SELECT 1;");

        let err = MigrationSource::open(dir.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate migration file"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MigrationSource::open(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Source(_)));
    }

    #[test]
    fn opens_from_file_url() {
        let dir = sample_dir();
        let url = Url::from_directory_path(dir.path()).unwrap();
        let source = MigrationSource::from_url(url.as_str()).unwrap();
        assert_eq!(source.first(), Some(1));

        assert!(MigrationSource::from_url("http://example.com/migrations").is_err());
    }
}
