use std::path::{Path, PathBuf};

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::optimizer::{BatchOptions, SolverId};
use crate::telemetry::LogFormat;

pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "DISPATCH__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub solver: SolverConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// `cbc` or `microlp`
    pub backend: String,
    /// Registered process-wide before the first solve; must exist when set
    pub cbc_path: Option<PathBuf>,
    /// Backend used when CBC cannot be located. Unset means fail instead.
    pub fallback: Option<SolverId>,
    /// 0 disables the limit
    pub timeout_seconds: u64,
    pub threads: Option<usize>,
    /// Keep the LP and solution files of external solves for inspection
    pub keep_model_files: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: "cbc".to_string(),
            cbc_path: None,
            fallback: None,
            timeout_seconds: 60,
            threads: None,
            keep_model_files: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub number_of_batches: Option<usize>,
    pub overlap: f64,
    pub carry_state: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        let options = BatchOptions::default();
        Self {
            number_of_batches: options.number_of_batches,
            overlap: options.overlap,
            carry_state: options.carry_state,
        }
    }
}

impl BatchConfig {
    pub fn options(&self) -> BatchOptions {
        BatchOptions {
            number_of_batches: self.number_of_batches,
            overlap: self.overlap,
            carry_state: self.carry_state,
            ..BatchOptions::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl Config {
    /// Built-in defaults, then `config/default.toml`, then `path`, then
    /// `DISPATCH__SECTION__KEY` environment variables.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(DEFAULT_CONFIG_FILE));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        Ok(Self::figment(path).extract()?)
    }
}
