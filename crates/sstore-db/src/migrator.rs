use sstore_common::{Error, Result};
use tracing::{debug, info};

use crate::driver::SqliteDriver;
use crate::migrations::{Direction, SchemaVersion};
use crate::source::MigrationSource;

/// One planned move between versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Step {
    /// Version whose file is executed.
    version: u64,
    direction: Direction,
    /// Version recorded once the step completes.
    target: Option<u64>,
}

/// Applies migrations from a [`MigrationSource`] to a [`SqliteDriver`].
pub struct Migrator {
    source: MigrationSource,
    driver: SqliteDriver,
}

impl Migrator {
    /// Build from a `file://` source URL and a `sqlite3://` database URL.
    pub fn new(source_url: &str, database_url: &str) -> Result<Self> {
        let source = MigrationSource::from_url(source_url)?;
        let driver = SqliteDriver::from_url(database_url)?;
        Ok(Self::with_instance(source, driver))
    }

    pub fn with_instance(source: MigrationSource, driver: SqliteDriver) -> Self {
        Self { source, driver }
    }

    pub fn driver(&self) -> &SqliteDriver {
        &self.driver
    }

    pub fn version(&self) -> Result<SchemaVersion> {
        self.driver.version()
    }

    /// Apply every pending up migration. Already current is `NoChange`.
    pub fn up(&mut self) -> Result<()> {
        let current = self.clean_version()?;
        let plan = self.plan_up(current, None);
        self.apply(&plan)
    }

    /// Revert every applied migration.
    pub fn down(&mut self) -> Result<()> {
        let current = self.clean_version()?;
        let plan = self.plan_down(current, None);
        self.apply(&plan)
    }

    /// Move up or down until `target` is the current version.
    pub fn goto(&mut self, target: u64) -> Result<()> {
        let current = self.clean_version()?;
        if !self.source.contains(target) {
            return Err(Error::NotFound(format!("no migration for version {target}")));
        }

        let plan = match current {
            Some(cur) if cur == target => Vec::new(),
            Some(cur) if cur > target => self
                .plan_down(current, None)
                .into_iter()
                .take_while(|step| step.version > target)
                .collect(),
            _ => self
                .plan_up(current, None)
                .into_iter()
                .take_while(|step| step.version <= target)
                .collect(),
        };
        self.apply(&plan)
    }

    /// Apply `n` migrations, up when positive and down when negative.
    /// Nothing to apply in that direction is `NoChange`; fewer than `|n|`
    /// available applies those and then returns `ShortLimit`.
    pub fn steps(&mut self, n: i64) -> Result<()> {
        let current = self.clean_version()?;
        let limit = n.unsigned_abs() as usize;
        let plan = match n {
            0 => Vec::new(),
            n if n > 0 => self.plan_up(current, Some(limit)),
            _ => self.plan_down(current, Some(limit)),
        };

        let short = limit.saturating_sub(plan.len());
        self.apply(&plan)?;
        if short > 0 {
            return Err(Error::ShortLimit(short as u64));
        }
        Ok(())
    }

    /// Current version, refusing to continue from a dirty database or from
    /// a version the source no longer knows about.
    fn clean_version(&self) -> Result<Option<u64>> {
        let current = self.driver.version()?;
        if current.dirty {
            return Err(Error::Dirty {
                version: current.version,
            });
        }
        if let Some(v) = current.version
            && !self.source.contains(v)
        {
            return Err(Error::Migration(format!(
                "no migration found for version {v} in {}",
                self.source.dir().display()
            )));
        }
        Ok(current.version)
    }

    fn plan_up(&self, current: Option<u64>, limit: Option<usize>) -> Vec<Step> {
        let mut plan = Vec::new();
        let mut next = match current {
            Some(v) => self.source.next(v),
            None => self.source.first(),
        };
        while let Some(version) = next {
            if limit.is_some_and(|l| plan.len() >= l) {
                break;
            }
            plan.push(Step {
                version,
                direction: Direction::Up,
                target: Some(version),
            });
            next = self.source.next(version);
        }
        plan
    }

    fn plan_down(&self, current: Option<u64>, limit: Option<usize>) -> Vec<Step> {
        let mut plan = Vec::new();
        let mut cursor = current;
        while let Some(version) = cursor {
            if limit.is_some_and(|l| plan.len() >= l) {
                break;
            }
            let target = self.source.prev(version);
            plan.push(Step {
                version,
                direction: Direction::Down,
                target,
            });
            cursor = target;
        }
        plan
    }

    fn apply(&mut self, plan: &[Step]) -> Result<()> {
        if plan.is_empty() {
            return Err(Error::NoChange);
        }

        for step in plan {
            let body = self.source.read(step.version, step.direction)?;
            match body {
                Some(body) => {
                    info!("applying {}/{}", step.version, step.direction);
                    self.driver.set_version(step.target, true)?;
                    self.driver.run(&body).map_err(|e| {
                        Error::Migration(format!(
                            "{}/{} failed: {e}",
                            step.version, step.direction
                        ))
                    })?;
                }
                None => debug!(
                    "no {} file for version {}, recording version only",
                    step.direction, step.version
                ),
            }
            self.driver.set_version(step.target, false)?;
        }
        Ok(())
    }
}
