use derive_getters::Getters;
use serde::Deserialize;

use crate::config::auth::AuthConfig;

#[derive(Debug, Deserialize, Getters)]
pub struct AccountConfig {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    /// Folders to back up, all folders of the account if unset.
    #[serde(default)]
    #[getter(skip)]
    folders: Option<Vec<String>>,
    /// Delete messages older than this many days after archiving them.
    #[serde(default)]
    #[getter(skip)]
    retention_days: Option<u32>,
    auth: AuthConfig,
}

impl AccountConfig {
    pub fn folders(&self) -> Option<&[String]> {
        self.folders.as_deref()
    }

    pub fn retention_days(&self) -> Option<u32> {
        self.retention_days
    }
}

fn default_port() -> u16 {
    993
}
