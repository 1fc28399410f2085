pub mod driver;
pub mod migrations;
pub mod migrator;
pub mod source;

pub use driver::SqliteDriver;
pub use migrations::{Direction, MigrationFile, SchemaVersion};
pub use migrator::Migrator;
pub use source::MigrationSource;
