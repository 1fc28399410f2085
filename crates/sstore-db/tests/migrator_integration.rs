use std::path::Path;

use sstore_common::Error;
use sstore_db::{Migrator, SchemaVersion};
use tempfile::TempDir;
use url::Url;

/// Lay out a migrations directory the way `db/migrations` looks on disk.
fn migrations_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    let files = [
        (
            "000001_create_sessions.up.sql",
            "CREATE TABLE sessions (id TEXT PRIMARY KEY, name TEXT NOT NULL);",
        ),
        ("000001_create_sessions.down.sql", "DROP TABLE sessions;"),
        (
            "000002_create_history.up.sql",
            "CREATE TABLE history (
                id INTEGER PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                cmd TEXT NOT NULL
            );
            CREATE INDEX idx_history_session ON history(session_id);",
        ),
        ("000002_create_history.down.sql", "DROP TABLE history;"),
        (
            "000003_session_notes.up.sql",
            "ALTER TABLE sessions ADD COLUMN notes TEXT;",
        ),
        (
            "000003_session_notes.down.sql",
            "ALTER TABLE sessions DROP COLUMN notes;",
        ),
    ];
    for (name, body) in files {
        std::fs::write(dir.path().join(name), body).expect("write migration");
    }
    dir
}

fn urls(migrations: &Path, db_path: &Path) -> (String, String) {
    let source = Url::from_directory_path(migrations)
        .expect("absolute migrations path")
        .to_string();
    let database = format!("sqlite3://{}", db_path.display());
    (source, database)
}

fn table_names(m: &Migrator) -> Vec<String> {
    let conn = m.driver().connection();
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
}

#[test]
fn up_down_round_trip_on_disk() {
    let migrations = migrations_dir();
    let data = tempfile::tempdir().unwrap();
    let db_path = data.path().join("session.db");
    let (source, database) = urls(migrations.path(), &db_path);

    let mut m = Migrator::new(&source, &database).unwrap();
    assert_eq!(m.version().unwrap(), SchemaVersion::default());

    m.up().unwrap();
    assert_eq!(m.version().unwrap(), SchemaVersion::clean(3));
    assert_eq!(
        table_names(&m),
        vec!["history", "schema_migrations", "sessions"]
    );

    m.down().unwrap();
    assert_eq!(m.version().unwrap(), SchemaVersion::default());
    assert_eq!(table_names(&m), vec!["schema_migrations"]);
}

#[test]
fn version_survives_reopening_the_database() {
    let migrations = migrations_dir();
    let data = tempfile::tempdir().unwrap();
    let db_path = data.path().join("session.db");
    let (source, database) = urls(migrations.path(), &db_path);

    {
        let mut m = Migrator::new(&source, &database).unwrap();
        m.goto(2).unwrap();
    }

    let mut m = Migrator::new(&source, &database).unwrap();
    assert_eq!(m.version().unwrap(), SchemaVersion::clean(2));
    assert!(m.goto(2).unwrap_err().is_no_change());

    m.up().unwrap();
    assert_eq!(m.version().unwrap(), SchemaVersion::clean(3));
}

#[test]
fn dirty_database_blocks_every_migration() {
    let migrations = migrations_dir();
    std::fs::write(
        migrations.path().join("000004_broken.up.sql"),
        "CREATE TABLE ok (id INTEGER); THIS IS NOT SQL;",
    )
    .unwrap();
    let data = tempfile::tempdir().unwrap();
    let (source, database) = urls(migrations.path(), &data.path().join("session.db"));

    let mut m = Migrator::new(&source, &database).unwrap();
    assert!(matches!(m.up().unwrap_err(), Error::Migration(_)));

    // earlier steps stay applied, the failed one is rolled back
    assert!(!table_names(&m).contains(&"ok".to_string()));
    assert_eq!(
        m.version().unwrap(),
        SchemaVersion {
            version: Some(4),
            dirty: true
        }
    );

    for result in [m.up(), m.down(), m.goto(1), m.steps(-1)] {
        assert!(matches!(result, Err(Error::Dirty { version: Some(4) })));
    }
}

#[test]
fn custom_migrations_table_from_url() {
    let migrations = migrations_dir();
    let data = tempfile::tempdir().unwrap();
    let (source, database) = urls(migrations.path(), &data.path().join("session.db"));
    let database = format!("{database}?x-migrations-table=sstore_versions");

    let mut m = Migrator::new(&source, &database).unwrap();
    m.steps(1).unwrap();
    assert_eq!(m.driver().migrations_table(), "sstore_versions");
    assert_eq!(table_names(&m), vec!["sessions", "sstore_versions"]);
}

#[test]
fn missing_migrations_directory_fails_to_open() {
    let data = tempfile::tempdir().unwrap();
    let (source, database) = urls(&data.path().join("absent"), &data.path().join("session.db"));

    let err = Migrator::new(&source, &database).err().unwrap();
    assert!(matches!(err, Error::Source(_)));
}

#[test]
fn no_tx_wrap_runs_bodies_that_manage_their_own_transaction() {
    let migrations = tempfile::tempdir().unwrap();
    std::fs::write(
        migrations.path().join("1_bulk.up.sql"),
        "BEGIN;
        CREATE TABLE bulk (id INTEGER PRIMARY KEY);
        INSERT INTO bulk (id) VALUES (1), (2);
        COMMIT;",
    )
    .unwrap();
    std::fs::write(migrations.path().join("1_bulk.down.sql"), "DROP TABLE bulk;").unwrap();
    let data = tempfile::tempdir().unwrap();

    let (source, wrapped) = urls(migrations.path(), &data.path().join("wrapped.db"));
    let mut m = Migrator::new(&source, &wrapped).unwrap();
    assert!(m.up().is_err());
    assert_eq!(
        m.version().unwrap(),
        SchemaVersion {
            version: Some(1),
            dirty: true
        }
    );

    let (source, unwrapped) = urls(migrations.path(), &data.path().join("unwrapped.db"));
    let mut m = Migrator::new(&source, &format!("{unwrapped}?x-no-tx-wrap=true")).unwrap();
    m.up().unwrap();
    assert_eq!(m.version().unwrap(), SchemaVersion::clean(1));
    assert_eq!(table_names(&m), vec!["bulk", "schema_migrations"]);
}
