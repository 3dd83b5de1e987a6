use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_CONFIG_KEY;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory of the sled database
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Key under which the serialized configuration lives
    #[serde(default = "default_config_key")]
    pub config_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            config_key: default_config_key(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("store.db_path cannot be empty".into()));
        }
        if self.config_key.is_empty() {
            return Err(Error::InvalidConfig("store.config_key cannot be empty".into()));
        }
        Ok(())
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/tmp/ncm/db")
}
fn default_config_key() -> String {
    DEFAULT_CONFIG_KEY.to_string()
}
