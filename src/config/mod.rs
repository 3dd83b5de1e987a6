//! Settings for the nodes configuration manager.
//!
//! Sources are merged with the following priority (later wins):
//! 1. Default values (hardcoded)
//! 2. File named by `NCM_CONFIG_PATH`, if set
//! 3. Override file passed to [`Settings::with_override_config`]
//! 4. Environment variables prefixed `NCM__` (e.g.
//!    `NCM__MANAGER__WATCHER__POLL_INTERVAL_MS=50`)

mod manager;
mod retry;
mod store;
pub use manager::*;
pub use retry::*;
pub use store::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::ENV_PREFIX;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Watcher, distributor and startup behaviour
    #[serde(default)]
    pub manager: ManagerConfig,
    /// Backing store location
    #[serde(default)]
    pub store: StoreConfig,
}

impl Settings {
    /// Builds settings from defaults, the optional `NCM_CONFIG_PATH` file and
    /// environment variables. Not validated; call [`validate`](Self::validate).
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("NCM_CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let settings: Self = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Merges `path` over the current values, then environment variables on
    /// top.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Loads and validates settings, optionally layering `path` on top.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let settings = Self::new()?;
        let settings = match path {
            Some(p) => settings.with_override_config(p)?,
            None => settings,
        };
        settings.validate()
    }

    pub fn validate(self) -> Result<Self> {
        self.manager.validate()?;
        self.store.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
