use std::collections::HashSet;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fewest options a ranked election can have.
pub const MIN_OPTIONS: usize = 2;

/// An election definition, as written by the operator in `<ident>.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElectionSpec {
    /// Human-readable title.
    pub title: String,
    /// The options voters rank, in display order. Option indices used by
    /// ballots and results refer to this list.
    #[serde(alias = "candidates")]
    pub options: Vec<String>,
}

impl ElectionSpec {
    /// Load and validate a definition file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::extract(Figment::from(Toml::file(path)))
    }

    /// Parse and validate a definition from TOML text.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::extract(Figment::from(Toml::string(toml)))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .extract::<Self>()
            .map_err(|e| ConfigError::Parse(e.to_string()))?
            .validate()
    }

    /// Check the definition describes a runnable election.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.title.trim().is_empty() {
            return Err(ConfigError::MissingTitle);
        }
        if self.options.len() < MIN_OPTIONS {
            return Err(ConfigError::TooFewOptions(self.options.len()));
        }
        let mut seen = HashSet::with_capacity(self.options.len());
        for option in &self.options {
            if option.trim().is_empty() {
                return Err(ConfigError::BlankOption);
            }
            if !seen.insert(option.as_str()) {
                return Err(ConfigError::DuplicateOption(option.clone()));
            }
        }
        Ok(self)
    }

    pub fn num_options(&self) -> usize {
        self.options.len()
    }
}

/// A malformed election definition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("file {0} not found")]
    NotFound(PathBuf),
    #[error("{0}")]
    Parse(String),
    #[error("the election must have a title")]
    MissingTitle,
    #[error("there must be at least {} options, found {0}", MIN_OPTIONS)]
    TooFewOptions(usize),
    #[error("options must not be blank")]
    BlankOption,
    #[error("option '{0}' is listed twice")]
    DuplicateOption(String),
}
