use std::io::Write;

use sstore_common::{Error, Result};
use sstore_config::ResolvedPaths;
use sstore_db::{Migrator, SchemaVersion};
use tracing::debug;

/// A migration request parsed from command-line style options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateCommand {
    Up,
    Down,
    Goto(u64),
    Steps(i64),
    Version,
}

impl MigrateCommand {
    /// Parse `--migrate-up`, `--migrate-down`, `--migrate-goto N`,
    /// `--migrate-steps N` or `--migrate-version`.
    pub fn from_opts<S: AsRef<str>>(opts: &[S]) -> Result<Self> {
        let Some(first) = opts.first() else {
            return Err(Error::InvalidCommand("no command given".into()));
        };

        let (command, used) = match first.as_ref() {
            "--migrate-up" => (MigrateCommand::Up, 1),
            "--migrate-down" => (MigrateCommand::Down, 1),
            "--migrate-version" => (MigrateCommand::Version, 1),
            "--migrate-goto" => {
                let arg = required_arg(opts, "--migrate-goto")?;
                let version = arg.parse::<u64>().map_err(|_| {
                    Error::InvalidCommand(format!("--migrate-goto expects a version, got {arg}"))
                })?;
                (MigrateCommand::Goto(version), 2)
            }
            "--migrate-steps" => {
                let arg = required_arg(opts, "--migrate-steps")?;
                let n = arg
                    .parse::<i64>()
                    .ok()
                    .filter(|n| *n != 0)
                    .ok_or_else(|| {
                        Error::InvalidCommand(format!(
                            "--migrate-steps expects a non-zero count, got {arg}"
                        ))
                    })?;
                (MigrateCommand::Steps(n), 2)
            }
            other => return Err(Error::InvalidCommand(other.to_string())),
        };

        if let Some(extra) = opts.get(used) {
            return Err(Error::InvalidCommand(format!(
                "unexpected argument {}",
                extra.as_ref()
            )));
        }
        Ok(command)
    }
}

fn required_arg<'a, S: AsRef<str>>(opts: &'a [S], flag: &str) -> Result<&'a str> {
    opts.get(1)
        .map(|s| s.as_ref())
        .ok_or_else(|| Error::InvalidCommand(format!("{flag} requires an argument")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Build a migration handle for the session database from the resolved
/// migrations directory and database path.
pub fn make_migrator(paths: &ResolvedPaths) -> Result<Migrator> {
    let source_url = paths.source_url()?;
    let database_url = paths.database_url()?;
    debug!("migration source {source_url}, database {database_url}");

    std::fs::create_dir_all(&paths.home_dir).map_err(|e| {
        Error::Config(format!(
            "failed to create home directory {}: {e}",
            paths.home_dir.display()
        ))
    })?;

    Migrator::new(&source_url, &database_url).map_err(|e| {
        Error::Migration(format!(
            "making migration [{source_url}] db[{}]: {e}",
            paths.db_path.display()
        ))
    })
}

pub fn migrate_up(paths: &ResolvedPaths) -> Result<()> {
    make_migrator(paths)?.up()
}

pub fn migrate_down(paths: &ResolvedPaths) -> Result<()> {
    make_migrator(paths)?.down()
}

pub fn migrate_goto(paths: &ResolvedPaths, version: u64) -> Result<()> {
    make_migrator(paths)?.goto(version)
}

pub fn migrate_steps(paths: &ResolvedPaths, n: i64) -> Result<()> {
    make_migrator(paths)?.steps(n)
}

pub fn migrate_version(paths: &ResolvedPaths) -> Result<SchemaVersion> {
    make_migrator(paths)?.version()
}

/// Bring the schema up to date at start-up. Already being current is fine.
pub fn try_migrate_up(
    paths: &ResolvedPaths,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<SchemaVersion> {
    ignore_no_change(migrate_up(paths))?;
    print_version(paths, format, out)
}

/// Write the current version to `out`. A dirty database is an error.
pub fn print_version(
    paths: &ResolvedPaths,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<SchemaVersion> {
    let version = migrate_version(paths)
        .map_err(|e| Error::Database(format!("error getting db version: {e}")))?;
    if version.dirty {
        return Err(Error::Dirty {
            version: version.version,
        });
    }

    match format {
        OutputFormat::Text => writeln!(out, "[db] {version}")?,
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, &version)?;
            writeln!(out)?;
        }
    }
    Ok(version)
}

/// Run the command named by `opts`, then report the resulting version.
pub fn migrate_command_opts<S: AsRef<str>>(
    paths: &ResolvedPaths,
    opts: &[S],
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<SchemaVersion> {
    let command = MigrateCommand::from_opts(opts)?;
    debug!("running {command:?}");

    let result = match command {
        MigrateCommand::Up => migrate_up(paths),
        MigrateCommand::Down => migrate_down(paths),
        MigrateCommand::Goto(version) => migrate_goto(paths, version),
        MigrateCommand::Steps(n) => migrate_steps(paths, n),
        MigrateCommand::Version => Ok(()),
    };
    ignore_no_change(result)?;

    print_version(paths, format, out)
}

fn ignore_no_change(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_no_change() => {
            debug!("no change");
            Ok(())
        }
        other => other,
    }
}
