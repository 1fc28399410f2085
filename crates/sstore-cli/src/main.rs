use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sstore_cli::{OutputFormat, migrate_command_opts};
use sstore_config::{ConfigLoader, HOME_ENV_VAR};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sstore", version)]
#[command(about = "Schema migrations for the sstore session database")]
struct Cli {
    /// Home directory holding the session database [default: ~/.sstore]
    #[arg(long, env = HOME_ENV_VAR)]
    home: Option<PathBuf>,

    /// Config file (YAML or TOML) instead of <home>/config.yml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session database file name inside the home directory
    #[arg(long)]
    db_name: Option<String>,

    /// Migrations directory [default: ./db/migrations]
    #[arg(long)]
    migrations_dir: Option<PathBuf>,

    /// Print the resulting version as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,

    /// --migrate-up | --migrate-down | --migrate-goto <N> | --migrate-steps <N> | --migrate-version
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout is reserved for the version line
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loader = ConfigLoader::new(cli.home)?.with_config_file(cli.config);
    let mut config = loader.load().context("failed to load configuration")?;
    if let Some(db_name) = cli.db_name {
        config.db_name = db_name;
    }
    if let Some(dir) = cli.migrations_dir {
        config.migrations_dir = dir;
    }

    let cwd = std::env::current_dir().context("failed to read working directory")?;
    let paths = loader.resolve(&config, &cwd);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let mut stdout = std::io::stdout().lock();
    migrate_command_opts(&paths, &cli.command, format, &mut stdout)?;
    Ok(())
}
