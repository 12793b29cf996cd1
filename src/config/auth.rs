use std::process::Command;

use derive_getters::Getters;
use serde::Deserialize;

use crate::config::ConfigError;

#[derive(Debug, Deserialize, Getters)]
pub struct PlainAuthConfig {
    user: String,
    #[getter(skip)]
    password_cmd: String,
}

impl PlainAuthConfig {
    /// Runs `password_cmd` and returns the first line it prints.
    pub fn password(&self) -> Result<String, ConfigError> {
        let mut cmd_parts = self.password_cmd.split_whitespace();
        let mut cmd = Command::new(cmd_parts.next().ok_or(ConfigError::EmptyPasswordCmd)?);
        cmd.args(cmd_parts);
        let output = cmd.output().map_err(ConfigError::PasswordCmd)?;
        if !output.status.success() {
            return Err(ConfigError::NoPassword);
        }

        let stdout = String::from_utf8(output.stdout).map_err(|_| ConfigError::NoPassword)?;
        match stdout.lines().next() {
            Some(password) if !password.is_empty() => Ok(password.to_owned()),
            _ => Err(ConfigError::NoPassword),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AuthConfig {
    Plain(PlainAuthConfig),
}
