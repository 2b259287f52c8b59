use std::fs;
use std::path::Path;
use std::time::Duration;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use common::error::{Error, Result};

use crate::discover::discover;
use crate::relabel::component;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// How often discovery runs and the relabel script is invoked.
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    pub log_level: String,
    pub discovery: discover::Arguments,
    /// Relabel script arguments. `targets` is filled by discovery each cycle.
    pub relabel: component::Arguments,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(15),
            log_level: "info".to_string(),
            discovery: discover::Arguments::default(),
            relabel: component::Arguments::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let raw = fs::read_to_string(path)?;
        Config::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Config> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval.is_zero() {
            return Err(Error::InvalidArguments("refresh_interval must be greater than zero".to_string()));
        }
        self.level()?;
        if !self.relabel.targets.is_empty() {
            return Err(Error::InvalidArguments(
                "relabel.targets is set by discovery; configure discovery.targets instead".to_string(),
            ));
        }
        self.relabel.validate()
    }

    pub fn level(&self) -> Result<LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| Error::InvalidArguments(format!("unknown log_level {:?}", self.log_level)))
    }
}
