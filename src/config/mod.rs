mod account;
mod auth;

use std::{
    collections::HashMap,
    env,
    fs::read_to_string,
    io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

pub use account::AccountConfig;
pub use auth::AuthConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path} is not readable")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config file {path} is not parseable")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("account {0} is not configured")]
    UnknownAccount(String),
    #[error("neither {0} nor HOME is set")]
    NoHome(&'static str),
    #[error("password_cmd is empty")]
    EmptyPasswordCmd,
    #[error("password_cmd could not be run")]
    PasswordCmd(#[source] io::Error),
    #[error("password_cmd failed or printed no password")]
    NoPassword,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    archive_dir: Option<PathBuf>,
    accounts: HashMap<String, AccountConfig>,
}

impl Config {
    pub fn load_from_file(file: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match file {
            Some(file) => file.to_path_buf(),
            None => default_location()?,
        };
        let contents = read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn account(&self, name: &str) -> Result<&AccountConfig, ConfigError> {
        self.accounts
            .get(name)
            .ok_or_else(|| ConfigError::UnknownAccount(name.to_owned()))
    }

    /// Directory holding the archive of `account`.
    pub fn archive_dir(&self, account: &str) -> Result<PathBuf, ConfigError> {
        let mut archive_dir = match &self.archive_dir {
            Some(archive_dir) => archive_dir.clone(),
            None => xdg_dir("XDG_DATA_HOME", ".local/share")?,
        };
        archive_dir.push(account);
        Ok(archive_dir)
    }
}

fn default_location() -> Result<PathBuf, ConfigError> {
    let mut config_file = xdg_dir("XDG_CONFIG_HOME", ".config")?;
    config_file.push("config.toml");
    Ok(config_file)
}

/// `$<variable>/imapbackup`, or `$HOME/<fallback>/imapbackup` if the variable is unset.
fn xdg_dir(variable: &'static str, fallback: &str) -> Result<PathBuf, ConfigError> {
    let mut dir = if let Some(dir) = env::var_os(variable).filter(|dir| !dir.is_empty()) {
        PathBuf::from(dir)
    } else {
        let mut home = PathBuf::from(env::var_os("HOME").ok_or(ConfigError::NoHome(variable))?);
        home.push(fallback);
        home
    };
    dir.push(env!("CARGO_PKG_NAME"));
    Ok(dir)
}
