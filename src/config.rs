//! Application configuration.
//!
//! Layered with figment, lowest to highest priority:
//!
//! 1. [`Config::default`]
//! 2. TOML file: `--config <FILE>` or `<config dir>/volclean/config.toml`
//! 3. Environment: `VOLCLEAN_BATCH_SIZE=500`, `VOLCLEAN_STORES__MUSIC=/vol/music`
//! 4. Command-line flags, applied by the caller after loading

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::ExecuteOptions;
use crate::plan::{PlanError, PurposeRules, RuleSpec};
use crate::scanner::hasher::{DEFAULT_CHUNK_SIZE, PREHASH_SIZE};
use crate::scanner::ScanConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "VOLCLEAN_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Rule(#[from] PlanError),

    #[error("Failed to determine the platform data directory; set work_dir")]
    NoDataDir,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where indexes, scan reports, plans, reports and backups live.
    /// Defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    pub batch_size: usize,
    /// Fingerprinting worker threads.
    pub io_threads: usize,
    /// Read size for full hashes, in bytes.
    pub chunk_size: usize,
    /// Ordered exclusion patterns; first match wins.
    pub exclude: Vec<String>,
    /// Extension allow-list; empty keeps every file.
    pub extensions: Vec<String>,
    pub skip_hidden: bool,
    pub follow_symlinks: bool,
    /// Move deleted duplicates to the system trash.
    pub use_trash: bool,
    /// RELOCATE category -> store directory.
    pub stores: BTreeMap<String, PathBuf>,
    /// Ordered purpose rules.
    pub rules: Vec<RuleSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: None,
            batch_size: 1000,
            io_threads: 4,
            chunk_size: DEFAULT_CHUNK_SIZE,
            exclude: default_excludes(),
            extensions: Vec::new(),
            skip_hidden: false,
            follow_symlinks: false,
            use_trash: false,
            stores: BTreeMap::new(),
            rules: Vec::new(),
        }
    }
}

fn default_excludes() -> Vec<String> {
    [
        ".git/",
        "__pycache__/",
        "node_modules/",
        ".venv/",
        "venv/",
        ".cache/",
        "_backups/",
        "_analysis/",
        ".Trash*/",
        ".DS_Store",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Config {
    /// Default config file location, if the platform has one.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "volclean").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The figment for defaults, `file` (or the default file) and the
    /// environment.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file.map(Path::to_path_buf).or_else(Self::default_path) {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate.
    ///
    /// # Errors
    ///
    /// An explicit `file` that does not exist is an error; a missing default
    /// file is not.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = file {
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
        }
        let config: Self = Self::figment(file).extract().map_err(Box::new)?;
        config.validate()?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Check value ranges and compile the purpose rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size",
                reason: "must be at least 1".into(),
            });
        }
        if !(1..=256).contains(&self.io_threads) {
            return Err(ConfigError::Invalid {
                field: "io_threads",
                reason: format!("must be between 1 and 256, got {}", self.io_threads),
            });
        }
        if self.chunk_size < PREHASH_SIZE {
            return Err(ConfigError::Invalid {
                field: "chunk_size",
                reason: format!("must be at least {PREHASH_SIZE} bytes"),
            });
        }
        if let Some(category) = self.stores.keys().find(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "stores",
                reason: format!("empty category name {category:?}"),
            });
        }
        self.purpose_rules()?;
        Ok(())
    }

    pub fn purpose_rules(&self) -> Result<PurposeRules, ConfigError> {
        Ok(PurposeRules::compile(&self.rules)?)
    }

    /// Configured work directory, or the platform data directory.
    pub fn resolved_work_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.work_dir {
            return Ok(dir.clone());
        }
        ProjectDirs::from("", "", "volclean")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(ConfigError::NoDataDir)
    }

    #[must_use]
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig::default()
            .with_exclude(self.exclude.clone())
            .with_extensions(self.extensions.clone())
            .with_skip_hidden(self.skip_hidden)
            .with_follow_symlinks(self.follow_symlinks)
    }

    #[must_use]
    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            use_trash: self.use_trash,
            stores: self.stores.clone(),
        }
    }
}
