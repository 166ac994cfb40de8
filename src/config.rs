use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::model::election::ConfigError;

/// File the application config is read from, relative to the working directory.
pub const CONFIG_FILE: &str = "Icelect.toml";

/// Prefix of environment variables overriding the config file.
pub const ENV_PREFIX: &str = "ICELECT_";

/// Application configuration, derived from `Icelect.toml` and `ICELECT_*`
/// environment variables on top of built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// JSON snapshot of the election store.
    data_file: PathBuf,
    /// Directory holding `<ident>.toml` election definitions and
    /// `<ident>.eligible` registration lists.
    election_dir: PathBuf,
    /// log4rs configuration for the command-line tools.
    log_config: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("icelect.json"),
            election_dir: PathBuf::from("etc"),
            log_config: PathBuf::from("log4rs.yaml"),
        }
    }
}

impl Config {
    /// The layered configuration sources, lowest precedence first.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load the application config.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment()
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Where the election store is persisted.
    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    /// Where the log4rs configuration lives.
    pub fn log_config(&self) -> &Path {
        &self.log_config
    }

    /// Definition file of the given election.
    pub fn election_file(&self, ident: &str) -> PathBuf {
        self.election_dir.join(format!("{ident}.toml"))
    }

    /// Default registration list of the given election.
    pub fn eligibility_file(&self, ident: &str) -> PathBuf {
        self.election_dir.join(format!("{ident}.eligible"))
    }
}
