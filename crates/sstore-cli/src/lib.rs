pub mod commands;

pub use commands::{
    MigrateCommand, OutputFormat, make_migrator, migrate_command_opts, migrate_down,
    migrate_goto, migrate_steps, migrate_up, migrate_version, print_version, try_migrate_up,
};
