use std::path::{Path, PathBuf};

use sstore_common::{Error, Result};
use tracing::{debug, info};

use crate::model::{ResolvedPaths, SstoreConfig};

/// Overrides the default `~/.sstore` home directory.
pub const HOME_ENV_VAR: &str = "SSTORE_HOME";

const HOME_DIR_NAME: &str = ".sstore";
const CONFIG_FILE_NAMES: [&str; 3] = ["config.yml", "config.yaml", "config.toml"];

/// Locates the sstore home directory and reads its optional config file.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    home_dir: PathBuf,
    config_file: Option<PathBuf>,
}

impl ConfigLoader {
    /// Home directory precedence: `home_override`, then `$SSTORE_HOME`, then
    /// `~/.sstore`.
    pub fn new(home_override: Option<PathBuf>) -> Result<Self> {
        let env_home = std::env::var_os(HOME_ENV_VAR).map(PathBuf::from);
        let home_dir = resolve_home(home_override, env_home, dirs::home_dir())?;
        debug!("sstore home: {}", home_dir.display());
        Ok(Self {
            home_dir,
            config_file: None,
        })
    }

    /// Use an explicit config file instead of searching the home directory.
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// The config file that [`load`](Self::load) will read, if any.
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_file {
            return Some(path.clone());
        }
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| self.home_dir.join(name))
            .find(|path| path.is_file())
    }

    /// Read the config file, or fall back to defaults when there is none.
    /// An explicit config file that doesn't exist is an error.
    pub fn load(&self) -> Result<SstoreConfig> {
        let Some(path) = self.config_path() else {
            debug!("no config file in {}, using defaults", self.home_dir.display());
            return Ok(SstoreConfig::default());
        };

        let config = parse_config(&path)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn resolve(&self, config: &SstoreConfig, cwd: &Path) -> ResolvedPaths {
        ResolvedPaths::resolve(config, &self.home_dir, cwd)
    }
}

fn resolve_home(
    home_override: Option<PathBuf>,
    env_home: Option<PathBuf>,
    user_home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(home) = home_override {
        return Ok(home);
    }
    if let Some(home) = env_home.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(home);
    }
    user_home
        .map(|home| home.join(HOME_DIR_NAME))
        .ok_or_else(|| {
            Error::Config(format!(
                "cannot determine home directory; set {HOME_ENV_VAR}"
            ))
        })
}

fn parse_config(path: &Path) -> Result<SstoreConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("read error for {}: {e}", path.display())))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("YAML parse error: {e}"))),
        "toml" => {
            toml::from_str(&contents).map_err(|e| Error::Config(format!("TOML parse error: {e}")))
        }
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}
